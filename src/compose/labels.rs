//! Provenance labels written onto everything compose creates.

pub const PROJECT: &str = "com.docker.compose.project";
pub const SERVICE: &str = "com.docker.compose.service";
pub const CONTAINER_NUMBER: &str = "com.docker.compose.container-number";
pub const NETWORK: &str = "com.docker.compose.network";
pub const VOLUME: &str = "com.docker.compose.volume";

pub fn project_filter(project: &str) -> Vec<(String, String)> {
    vec![(PROJECT.to_string(), project.to_string())]
}

pub fn service_filter(project: &str, service: &str) -> Vec<(String, String)> {
    vec![
        (PROJECT.to_string(), project.to_string()),
        (SERVICE.to_string(), service.to_string()),
    ]
}
