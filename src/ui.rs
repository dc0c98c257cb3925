use crate::channels::Channel;

pub fn render_index(channels: &[Channel]) -> String {
    let options: String = channels
        .iter()
        .map(|channel| {
            format!(
                "<option value=\"{}\">{}</option>",
                escape_html(channel.video_id),
                escape_html(channel.title)
            )
        })
        .collect();
    let first = channels.first().map(|channel| channel.video_id).unwrap_or_default();
    INDEX_HTML
        .replace("{{CHANNEL_OPTIONS}}", &options)
        .replace("{{FIRST_VIDEO}}", &escape_html(first))
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Watch Tracker</title>
  <style>
    @import url('https://fonts.googleapis.com/css2?family=Space+Grotesk:wght@400;500;600&family=Fraunces:wght@600&display=swap');

    :root {
      --bg-1: #f8f3e6;
      --ink: #2b2a28;
      --accent: #ff6b4a;
      --accent-2: #2f4858;
      --card: rgba(255, 255, 255, 0.86);
      --shadow: 0 24px 60px rgba(47, 72, 88, 0.18);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: linear-gradient(135deg, var(--bg-1), #ffe9d4 60%, #f9f2e9 100%);
      color: var(--ink);
      font-family: "Space Grotesk", "Trebuchet MS", sans-serif;
      display: grid;
      place-items: center;
      padding: 32px 18px 48px;
    }

    .app {
      width: min(860px, 100%);
      background: var(--card);
      border-radius: 28px;
      box-shadow: var(--shadow);
      padding: 32px;
      display: grid;
      gap: 24px;
    }

    h1 {
      font-family: "Fraunces", "Georgia", serif;
      font-weight: 600;
      margin: 0;
    }

    .row {
      display: flex;
      gap: 12px;
      align-items: center;
      flex-wrap: wrap;
    }

    input, select {
      border: 1px solid rgba(47, 72, 88, 0.2);
      border-radius: 12px;
      padding: 10px 12px;
      font: inherit;
    }

    button {
      border: none;
      border-radius: 999px;
      padding: 12px 18px;
      font: inherit;
      font-weight: 600;
      cursor: pointer;
      background: var(--accent);
      color: white;
    }

    button.secondary {
      background: var(--accent-2);
    }

    .clock {
      font-family: ui-monospace, monospace;
      font-size: 2rem;
    }

    .hidden {
      display: none;
    }

    .grid {
      display: grid;
      grid-template-columns: repeat(7, 1fr);
      gap: 4px;
    }

    .cell {
      min-height: 64px;
      border: 1px solid rgba(47, 72, 88, 0.12);
      border-radius: 10px;
      padding: 6px;
      font-size: 0.85rem;
      background: white;
    }

    .cell .spent {
      display: block;
      margin-top: 6px;
      color: var(--accent-2);
      font-weight: 600;
    }
  </style>
</head>
<body>
  <main class="app">
    <h1>Watch Tracker</h1>

    <section id="signin" class="row">
      <input id="email" type="email" placeholder="Enter your email" />
      <button id="start">Start watching</button>
    </section>

    <section id="player" class="hidden">
      <div class="row">
        <select id="channel">{{CHANNEL_OPTIONS}}</select>
        <button id="toggle">Play</button>
        <span id="clock" class="clock">00:00:00</span>
      </div>
      <div class="hidden"><div id="youtube-player"></div></div>
    </section>

    <section id="calendar" class="hidden">
      <div class="row">
        <button class="secondary" id="prev">&larr;</button>
        <strong id="month-label"></strong>
        <button class="secondary" id="next">&rarr;</button>
      </div>
      <div id="days" class="grid"></div>
    </section>
  </main>

  <script>
    const state = { user: '', playing: false, year: 0, month: 0, player: null };

    const formatTime = (seconds) => {
      const hrs = Math.floor(seconds / 3600);
      const mins = Math.floor((seconds % 3600) / 60);
      const secs = seconds % 60;
      return [hrs, mins, secs].map((n) => String(n).padStart(2, '0')).join(':');
    };

    async function post(path, body) {
      const res = await fetch(path, {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify(body),
      });
      if (!res.ok) throw new Error(await res.text());
      return res.json();
    }

    async function refreshClock() {
      if (!state.user) return;
      const res = await fetch(`/api/elapsed?user=${encodeURIComponent(state.user)}`);
      if (res.ok) {
        const snap = await res.json();
        document.getElementById('clock').textContent = formatTime(snap.elapsed_seconds);
      }
    }

    async function refreshCalendar() {
      const query = `user=${encodeURIComponent(state.user)}&year=${state.year}&month=${state.month}`;
      const res = await fetch(`/api/calendar?${query}`);
      if (!res.ok) return;
      const data = await res.json();
      const first = new Date(state.year, state.month - 1, 1);
      const daysInMonth = new Date(state.year, state.month, 0).getDate();
      const cells = [];
      for (let i = 0; i < first.getDay(); i++) cells.push('<div></div>');
      for (let day = 1; day <= daysInMonth; day++) {
        const key = `${state.year}-${String(state.month).padStart(2, '0')}-${String(day).padStart(2, '0')}`;
        const spent = data.days[key];
        cells.push(`<div class="cell">${day}${spent ? `<span class="spent">${formatTime(spent)}</span>` : ''}</div>`);
      }
      document.getElementById('days').innerHTML = cells.join('');
      document.getElementById('month-label').textContent =
        first.toLocaleString(undefined, { month: 'long', year: 'numeric' });
    }

    function shiftMonth(delta) {
      const next = new Date(state.year, state.month - 1 + delta, 1);
      state.year = next.getFullYear();
      state.month = next.getMonth() + 1;
      refreshCalendar();
    }

    function onPlayerStateChange(event) {
      state.playing = event.data === 1;
      document.getElementById('toggle').textContent = state.playing ? 'Pause' : 'Play';
      post('/api/playback', { user: state.user, code: event.data }).catch(console.error);
    }

    window.onYouTubeIframeAPIReady = () => {
      state.player = new YT.Player('youtube-player', {
        videoId: '{{FIRST_VIDEO}}',
        events: { onStateChange: onPlayerStateChange },
        playerVars: { playsinline: 1, modestbranding: 1, controls: 0 },
      });
    };

    document.getElementById('start').addEventListener('click', async () => {
      const user = document.getElementById('email').value.trim();
      if (!user) return;
      state.user = user;
      await post('/api/session', { user });
      const now = new Date();
      state.year = now.getFullYear();
      state.month = now.getMonth() + 1;
      document.getElementById('signin').classList.add('hidden');
      document.getElementById('player').classList.remove('hidden');
      document.getElementById('calendar').classList.remove('hidden');
      const tag = document.createElement('script');
      tag.src = 'https://www.youtube.com/iframe_api';
      document.body.appendChild(tag);
      refreshClock();
      refreshCalendar();
      setInterval(refreshClock, 1000);
      setInterval(refreshCalendar, 15000);
    });

    document.getElementById('toggle').addEventListener('click', () => {
      if (!state.player) return;
      if (state.playing) state.player.pauseVideo();
      else state.player.playVideo();
    });

    document.getElementById('channel').addEventListener('change', async (event) => {
      const videoId = event.target.value;
      await post('/api/channel', { user: state.user, video_id: videoId });
      if (state.player) state.player.loadVideoById({ videoId });
    });

    document.getElementById('prev').addEventListener('click', () => shiftMonth(-1));
    document.getElementById('next').addEventListener('click', () => shiftMonth(1));
  </script>
</body>
</html>
"#;
