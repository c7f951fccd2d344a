//! Account team listing.

use xmit_protocol::wire::Team;
use xmit_transfer::{discover, Uploader};
use xmit_types::Result;

use crate::config::Config;

use super::check_response;

pub struct TeamListing {
    pub teams: Vec<Team>,
    pub management_url: Option<String>,
}

pub fn run(config: &Config) -> Result<TeamListing> {
    let discovery = discover(&config.base_url)?;
    let key = config.require_key(discovery.api_key_management_url.as_deref())?;

    let uploader = Uploader::new(&discovery.url, 1)?;
    let response = uploader.list_teams(key)?;
    check_response(&response.notes())?;

    Ok(TeamListing {
        teams: response.teams.unwrap_or_default(),
        management_url: response.management_url,
    })
}
