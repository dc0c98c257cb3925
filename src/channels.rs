use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub title: &'static str,
    pub video_id: &'static str,
}

pub const NEWS_CHANNELS: &[Channel] = &[
    Channel {
        title: "LN+ EN VIVO | Últimas noticias de Argentina y el mundo",
        video_id: "G5pHuBCqgrs",
    },
    Channel {
        title: "TN EN VIVO I SEGUÍ LA TRANSMISIÓN EN VIVO DE TODO NOTICIAS",
        video_id: "cb12KmMMDJA",
    },
    Channel {
        title: "EN VIVO: Univision Noticias 24/7",
        video_id: "V4C7VNfRATA",
    },
    Channel {
        title: "🔴 DW Español | En vivo",
        video_id: "Io5mt83nCcU",
    },
    Channel {
        title: "euronews en directo",
        video_id: "O9mOtdZ-nSk",
    },
    Channel {
        title: "FRANCE 24 Español – EN VIVO",
        video_id: "Y-IlMeCCtIg",
    },
];

pub fn default_channel() -> &'static Channel {
    &NEWS_CHANNELS[0]
}

pub fn find_channel(video_id: &str) -> Option<&'static Channel> {
    let video_id = video_id.trim();
    NEWS_CHANNELS.iter().find(|channel| channel.video_id == video_id)
}
