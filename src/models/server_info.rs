use semver::Version as Semver;
use serde::{Deserialize, Serialize};

/// Answer of `GET /`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerInfo {
    #[serde(rename = "name")]
    hostname: String,
    #[serde(rename = "cluster_name")]
    name: String,
    #[serde(rename = "cluster_uuid")]
    uuid: Option<String>,
    version: Version,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Version {
    number: String,
    #[serde(default)]
    lucene_version: Option<String>,
}

impl ServerInfo {
    pub fn get_hostname(&self) -> &String {
        &self.hostname
    }
    pub fn get_name(&self) -> &String {
        &self.name
    }
    pub fn get_uuid(&self) -> &Option<String> {
        &self.uuid
    }
    pub fn get_version(&self) -> &String {
        &self.version.number
    }
    pub fn get_lucene_version(&self) -> Option<&str> {
        self.version.lucene_version.as_deref()
    }

    /// Major version, `None` for version strings that are not semver
    /// (e.g. `8.0.0-SNAPSHOT` parses, `7.10` does not).
    pub fn get_version_major(&self) -> Option<u64> {
        Semver::parse(&self.version.number)
            .ok()
            .map(|version| version.major)
    }

    /// Clusters from 8.0 on reject `_type` in bulk action lines.
    pub fn rejects_mapping_types(&self) -> bool {
        self.get_version_major().map_or(false, |major| major >= 8)
    }
}
