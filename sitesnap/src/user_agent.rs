//! Client identification strings sent with every API request.

/// A named tool whose version may or may not be known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionProbe {
    pub name: String,
    pub version: Option<String>,
}

impl VersionProbe {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

pub fn client_info() -> String {
    format!("sitesnap/{}", env!("CARGO_PKG_VERSION"))
}

/// `name/version` pairs for every probe with a known, non-empty version,
/// joined with `"; "`.
pub fn environment_info(probes: &[VersionProbe]) -> String {
    probes
        .iter()
        .filter_map(|probe| match probe.version.as_deref() {
            Some(version) if !version.is_empty() => Some(format!("{}/{}", probe.name, version)),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Full `User-Agent` header value.
pub fn user_agent(probes: &[VersionProbe]) -> String {
    let environment = environment_info(probes);
    if environment.is_empty() {
        client_info()
    } else {
        format!("{} ({})", client_info(), environment)
    }
}
