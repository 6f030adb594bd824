//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use course_mirror::config::DEFAULT_RESOLUTION_CONCURRENCY;

/// Mirror course file trees from a learning portal to local storage.
///
/// Authenticates against the school's portal, lists the user's courses, and
/// recursively downloads every file resource into a local directory tree.
#[derive(Parser, Debug)]
#[command(name = "course-mirror")]
#[command(author, version, about)]
pub struct Args {
    /// School/tenant identifier (the portal subdomain)
    pub school: String,

    /// Portal account user name (required unless --session-id is given)
    #[arg(short, long)]
    pub username: Option<String>,

    /// Portal account password (required unless --session-id is given)
    #[arg(short, long)]
    pub password: Option<String>,

    /// Pre-obtained portal session id; skips the login step
    #[arg(long, conflicts_with_all = ["username", "password"])]
    pub session_id: Option<String>,

    /// Directory course trees are mirrored into
    #[arg(short, long, default_value = "downloads")]
    pub output: PathBuf,

    /// Re-download files that already exist locally
    #[arg(long)]
    pub overwrite: bool,

    /// Maximum concurrent file resolutions (1-100)
    #[arg(short = 'c', long, default_value_t = DEFAULT_RESOLUTION_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Portal base URL override (defaults to https://<school>.itslearning.com)
    #[arg(long)]
    pub portal_url: Option<String>,

    /// Resource base URL override
    #[arg(long)]
    pub resource_url: Option<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parse_successfully() {
        let args = Args::try_parse_from(["course-mirror", "nord-college"]).unwrap();
        assert_eq!(args.school, "nord-college");
        assert!(!args.overwrite);
        assert!(!args.quiet);
        assert_eq!(args.verbose, 0);
        assert_eq!(args.concurrency, 8); // DEFAULT_RESOLUTION_CONCURRENCY
        assert_eq!(args.output, PathBuf::from("downloads"));
    }

    #[test]
    fn test_cli_requires_school() {
        let result = Args::try_parse_from(["course-mirror"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_session_id_conflicts_with_credentials() {
        let result = Args::try_parse_from([
            "course-mirror",
            "nord-college",
            "--session-id",
            "abc",
            "--username",
            "kim",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["course-mirror", "nord-college", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_concurrency_range_enforced() {
        let result =
            Args::try_parse_from(["course-mirror", "nord-college", "--concurrency", "0"]);
        assert!(result.is_err());

        let args =
            Args::try_parse_from(["course-mirror", "nord-college", "--concurrency", "100"])
                .unwrap();
        assert_eq!(args.concurrency, 100);
    }
}
