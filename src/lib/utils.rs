//! Utility functions.
use std::path::Path;

use anyhow::anyhow;

/// The capacity of the buffered readers and writers over FASTQ files.
pub const BUFSIZE: usize = 64 * 1024;

pub mod built_info {
    use lazy_static::lazy_static;
    include!(concat!(env!("OUT_DIR"), "/built.rs"));

    /// Get a software version string including
    ///   - Git commit hash
    ///   - Git dirty info (whether the repo had uncommitted changes)
    ///   - Cargo package version if no git info found
    fn get_software_version() -> String {
        let prefix = if let Some(s) = GIT_COMMIT_HASH {
            format!("{}-{}", PKG_VERSION, s[0..8].to_owned())
        } else {
            // This shouldn't happen
            PKG_VERSION.to_string()
        };
        let suffix = match GIT_DIRTY {
            Some(true) => "-dirty",
            _ => "",
        };
        format!("{}{}", prefix, suffix)
    }

    lazy_static! {
        /// Version of the software with git hash
        pub static ref VERSION: String = get_software_version();
    }
}

/// The final component of the path, used to name demultiplexed outputs.
pub fn source_basename<P: AsRef<Path>>(path: P) -> anyhow::Result<String> {
    let path = path.as_ref();
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("Input path has no file name: {}", path.to_string_lossy()))
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_source_basename() {
        assert_eq!(source_basename("/data/run1/sample.fastq").unwrap(), "sample.fastq");
        assert_eq!(source_basename("sample.fq").unwrap(), "sample.fq");
        assert!(source_basename("/").is_err());
        assert!(source_basename("..").is_err());
    }
}
