//! Release archive filename grammar.
//!
//! Provider binaries are distributed as
//! `terraform-provider-<type>_<version>_<os>_<arch>.zip`; anything that
//! deviates from that form is rejected before any upstream traffic happens.

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static RELEASE_ARCHIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^terraform-provider-(?P<type>\w+)_(?P<version>[\w.]+)_(?P<os>[a-z]+)_(?P<arch>[a-z0-9]+)\.zip$")
        .expect("release archive regex")
});

/// A parsed release archive filename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveName {
    pub type_name: String,
    pub version: String,
    pub os: String,
    pub arch: String,
}

impl ArchiveName {
    /// Parse a filename of the standard release form.
    pub fn parse(filename: &str) -> Result<Self> {
        let caps = RELEASE_ARCHIVE
            .captures(filename)
            .ok_or_else(|| Error::InvalidArchiveName(filename.to_string()))?;

        Ok(Self {
            type_name: caps["type"].to_string(),
            version: caps["version"].to_string(),
            os: caps["os"].to_string(),
            arch: caps["arch"].to_string(),
        })
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "terraform-provider-{}_{}_{}_{}.zip",
            self.type_name, self.version, self.os, self.arch
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_release_names() {
        let cases = [
            ("terraform-provider-foo_1.2.3_darwin_amd64.zip", true),
            ("terraform-provider-foo_1.2.3_darwin_amd64", false),
            ("terraform-provider-foo_1.2.3_darwin_amd64.zip.zip", false),
            ("terraform-provider-foo_darwin_amd64.zip.zip", false),
            ("terraform-provider-foo__darwin_amd64.zip.zip", false),
            ("terraform-provider-random_3.6.0_linux_AMD64.zip", false),
            ("terraform-provider-random_3.6.0_Linux_amd64.zip", false),
            ("terraform-provider-aws_5.31.0_windows_386.zip", true),
        ];

        for (given, expected) in cases {
            assert_eq!(ArchiveName::parse(given).is_ok(), expected, "{given}");
        }
    }

    #[test]
    fn parse_extracts_components() {
        let a = ArchiveName::parse("terraform-provider-random_3.6.0_linux_amd64.zip").unwrap();
        assert_eq!(a.type_name, "random");
        assert_eq!(a.version, "3.6.0");
        assert_eq!(a.os, "linux");
        assert_eq!(a.arch, "amd64");
        assert_eq!(
            a.to_string(),
            "terraform-provider-random_3.6.0_linux_amd64.zip"
        );
    }
}
