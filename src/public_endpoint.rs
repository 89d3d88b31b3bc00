use crate::{config::PublicEndpoint, domain::hash::TrackId};

/// returns url of the public page of a song, used for sharing
pub fn get_share_url(conf: &PublicEndpoint, track: &TrackId) -> String {
    let url = conf.base_url.trim_end_matches('/');
    format!("{url}/song/{track}")
}
