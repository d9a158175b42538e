use clap::{Args, Parser, Subcommand};

use tsukimi_core::models::{AiringStatus, Language, TitleKind};

#[derive(Debug, Parser)]
#[command(name = "tsukimi", version, about = "Watch progress and stream resolution")]
pub struct Cli {
    /// Remote user id; enables progress sync together with --token.
    #[arg(long, global = true, requires = "token")]
    pub user: Option<String>,

    /// Bearer token for the remote progress service.
    #[arg(long, global = true, requires = "user")]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect or edit local watch progress.
    #[command(subcommand)]
    Progress(ProgressCommand),
    /// Build the embed URL for an episode.
    Resolve(ResolveArgs),
    /// List the aired episodes of a title.
    Episodes(EpisodesArgs),
    /// List enabled sources and the languages they offer.
    Sources,
}

#[derive(Debug, Subcommand)]
pub enum ProgressCommand {
    /// Continue-watching list, most recently accessed first.
    List {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Mark an episode as the last one watched.
    Record {
        id: u64,
        episode: u32,
        #[arg(long, default_value = "")]
        title: String,
        /// movie or series; an existing entry keeps its kind when omitted.
        #[arg(long, value_parser = parse_kind)]
        kind: Option<TitleKind>,
    },
    /// Touch a title without changing its episode.
    Access {
        id: u64,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, value_parser = parse_kind)]
        kind: Option<TitleKind>,
    },
    /// Forget a title locally and remotely.
    Remove { id: u64 },
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    pub id: u64,
    pub episode: u32,
    /// Source id from the catalog; defaults to `player.default_source`.
    #[arg(short, long)]
    pub source: Option<String>,
    #[arg(short, long, value_parser = parse_language)]
    pub language: Option<Language>,
    /// MyAnimeList id, skips the mapping lookup for sources keyed on it.
    #[arg(long)]
    pub external_id: Option<u64>,
}

#[derive(Debug, Args)]
pub struct EpisodesArgs {
    pub id: u64,
    #[arg(long, value_parser = parse_status, default_value = "finished")]
    pub status: AiringStatus,
    #[arg(long)]
    pub total: Option<u32>,
    #[arg(long)]
    pub released: Option<u32>,
    #[arg(long)]
    pub next_airing: Option<u32>,
    /// Skip the mapping service and print numbers only.
    #[arg(long)]
    pub offline: bool,
}

fn parse_language(s: &str) -> Result<Language, String> {
    Language::from_str_opt(s).ok_or_else(|| format!("unknown language `{s}` (sub, dub, hindi)"))
}

fn parse_kind(s: &str) -> Result<TitleKind, String> {
    TitleKind::from_str_opt(s).ok_or_else(|| format!("unknown kind `{s}` (movie, series)"))
}

fn parse_status(s: &str) -> Result<AiringStatus, String> {
    match s.to_ascii_lowercase().replace('-', "_").as_str() {
        "finished" => Ok(AiringStatus::Finished),
        "releasing" => Ok(AiringStatus::Releasing),
        "not_yet_released" => Ok(AiringStatus::NotYetReleased),
        "cancelled" => Ok(AiringStatus::Cancelled),
        "hiatus" => Ok(AiringStatus::Hiatus),
        _ => Err(format!("unknown airing status `{s}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resolve() {
        let cli = Cli::try_parse_from([
            "tsukimi", "resolve", "21", "12", "-s", "vidsrc", "-l", "DUB",
        ])
        .unwrap();
        let Command::Resolve(args) = cli.command else {
            panic!("expected resolve");
        };
        assert_eq!(args.id, 21);
        assert_eq!(args.episode, 12);
        assert_eq!(args.source.as_deref(), Some("vidsrc"));
        assert_eq!(args.language, Some(Language::Dub));
    }

    #[test]
    fn test_credentials_come_in_pairs() {
        assert!(Cli::try_parse_from(["tsukimi", "--user", "u1", "sources"]).is_err());
        let cli =
            Cli::try_parse_from(["tsukimi", "sources", "--user", "u1", "--token", "t"]).unwrap();
        assert_eq!(cli.user.as_deref(), Some("u1"));
    }

    #[test]
    fn test_record_kind_is_optional() {
        let cli = Cli::try_parse_from(["tsukimi", "progress", "record", "9", "1"]).unwrap();
        let Command::Progress(ProgressCommand::Record { kind, .. }) = cli.command else {
            panic!("expected progress record");
        };
        assert_eq!(kind, None);

        let cli = Cli::try_parse_from(["tsukimi", "progress", "access", "9", "--kind", "movie"])
            .unwrap();
        let Command::Progress(ProgressCommand::Access { kind, .. }) = cli.command else {
            panic!("expected progress access");
        };
        assert_eq!(kind, Some(TitleKind::Movie));
        let bad = Cli::try_parse_from(["tsukimi", "progress", "access", "9", "--kind", "ova"]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("not-yet-released"), Ok(AiringStatus::NotYetReleased));
        assert_eq!(parse_status("RELEASING"), Ok(AiringStatus::Releasing));
        assert!(parse_status("airing").is_err());
    }
}
