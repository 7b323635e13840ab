use serde::Serialize;

pub(crate) mod attempt;
pub(crate) mod exam;
pub(crate) mod notification;
pub(crate) mod user;
pub(crate) mod video;

use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: String,
    pub(crate) version: String,
    pub(crate) environment: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: HashMap<String, String>,
}
