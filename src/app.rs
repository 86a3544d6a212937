use crate::config::Settings;
use crate::net::Net;
use crate::shell::Runner;
use crate::system::Privilege;
use crate::term::Prompt;

/// What every workflow needs: settings plus the external seams.
pub struct App<'a> {
    pub settings: &'a Settings,
    pub runner: &'a dyn Runner,
    pub net: &'a dyn Net,
    pub privilege: &'a dyn Privilege,
    pub prompt: &'a mut dyn Prompt,
}
