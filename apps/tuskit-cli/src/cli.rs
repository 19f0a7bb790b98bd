use std::path::PathBuf;

use clap::{ArgAction, Parser};
use url::Url;

/// Upload a file to a tus server, resuming after interruptions.
#[derive(Debug, Parser)]
#[command(name = "tuskit", version, about)]
pub struct Cli {
    /// Creation endpoint of the tus server
    pub endpoint: Url,

    /// File to upload
    pub file: PathBuf,

    /// Upload metadata entry (repeatable)
    #[arg(short = 'm', long = "metadata", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub metadata: Vec<(String, String)>,

    /// Extra request header (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Media type of the file, also sent as `filetype` metadata
    #[arg(long = "content-type", value_name = "MIME")]
    pub content_type: Option<String>,

    /// Bytes per chunk inside a PATCH body
    #[arg(long = "chunk-size", value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Maximum bytes sent by one PATCH request
    #[arg(long = "payload-size", value_name = "BYTES")]
    pub payload_size: Option<u64>,

    /// Fingerprint the file by content hash instead of path and size
    #[arg(long = "content-hash")]
    pub content_hash: bool,

    /// Attempts after a retryable failure
    #[arg(short = 'r', long = "retries", value_name = "N")]
    pub retries: Option<u32>,

    /// Config file (TOML)
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    if key.is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| format!("expected \"NAME: VALUE\", got {s:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {s:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn key_value_pairs() {
        assert_eq!(
            parse_key_value("filename=a=b.txt").unwrap(),
            ("filename".into(), "a=b.txt".into())
        );
        assert_eq!(parse_key_value("flag=").unwrap(), ("flag".into(), String::new()));
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn headers() {
        assert_eq!(
            parse_header("Authorization: Bearer x:y").unwrap(),
            ("Authorization".into(), "Bearer x:y".into())
        );
        assert!(parse_header("Authorization").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn full_command_line() {
        let cli = Cli::try_parse_from([
            "tuskit",
            "https://tus.example/files/",
            "video.mp4",
            "-m",
            "filename=video.mp4",
            "--metadata",
            "owner=me",
            "-H",
            "X-Api-Key: k",
            "--chunk-size",
            "65536",
            "--payload-size",
            "1048576",
            "-r",
            "2",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.endpoint.as_str(), "https://tus.example/files/");
        assert_eq!(cli.file, PathBuf::from("video.mp4"));
        assert_eq!(cli.metadata.len(), 2);
        assert_eq!(cli.headers, vec![(String::from("X-Api-Key"), String::from("k"))]);
        assert_eq!(cli.chunk_size, Some(65_536));
        assert_eq!(cli.payload_size, Some(1_048_576));
        assert_eq!(cli.retries, Some(2));
        assert_eq!(cli.verbose, 2);
        assert!(!cli.content_hash);
    }

    #[test]
    fn rejects_bad_endpoint() {
        assert!(Cli::try_parse_from(["tuskit", "not a url", "f"]).is_err());
    }
}
