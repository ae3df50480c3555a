//! Command-line argument surface.
//!
//! One mode per invocation: list, add, remove, extract or debug. The modes
//! are mutually exclusive and exactly one must be given.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, PartialEq)]
#[command(
    name = "segfs",
    about = "A user-space filesystem stored inside fixed-size segment files",
    version
)]
#[command(group(ArgGroup::new("mode").required(true)))]
pub struct Cli {
    /// List the filesystem tree rooted at /
    #[arg(short = 'l', group = "mode")]
    pub list: bool,

    /// Add the contents of a local file at this filesystem path
    #[arg(short = 'a', value_name = "FS_PATH", group = "mode", requires = "local_file")]
    pub add: Option<String>,

    /// Local file whose contents are added (used with -a)
    #[arg(short = 'f', value_name = "LOCAL_FILE", requires = "add")]
    pub local_file: Option<PathBuf>,

    /// Remove the file or directory subtree at this path
    #[arg(short = 'r', value_name = "FS_PATH", group = "mode")]
    pub remove: Option<String>,

    /// Write the file at this path to standard output
    #[arg(short = 'e', value_name = "FS_PATH", group = "mode")]
    pub extract: Option<String>,

    /// Print a human-readable structure summary for this path
    #[arg(short = 'D', value_name = "FS_PATH", group = "mode")]
    pub debug: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        let cli = Cli::parse_from(["segfs", "-l"]);
        assert!(cli.list);
        assert_eq!(cli.add, None);
    }

    #[test]
    fn test_parse_add_with_local_file() {
        let cli = Cli::parse_from(["segfs", "-a", "/a/b/t.txt", "-f", "local.txt"]);
        assert_eq!(cli.add.as_deref(), Some("/a/b/t.txt"));
        assert_eq!(cli.local_file, Some(PathBuf::from("local.txt")));
    }

    #[test]
    fn test_parse_single_path_modes() {
        let cli = Cli::parse_from(["segfs", "-r", "/x"]);
        assert_eq!(cli.remove.as_deref(), Some("/x"));

        let cli = Cli::parse_from(["segfs", "-e", "/x"]);
        assert_eq!(cli.extract.as_deref(), Some("/x"));

        let cli = Cli::parse_from(["segfs", "-D", "/x"]);
        assert_eq!(cli.debug.as_deref(), Some("/x"));
    }

    #[test]
    fn test_modes_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["segfs", "-l", "-r", "/x"]).is_err());
        assert!(Cli::try_parse_from(["segfs"]).is_err());
    }

    #[test]
    fn test_add_requires_local_file() {
        assert!(Cli::try_parse_from(["segfs", "-a", "/x"]).is_err());
        assert!(Cli::try_parse_from(["segfs", "-f", "local.txt"]).is_err());
    }
}
