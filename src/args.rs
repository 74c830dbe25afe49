use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use wiki_harvest::config::{CrawlConfig, SeedMode, ServerConfig};
use wiki_harvest::error::ConfigError;

#[derive(Parser, Debug)]
#[command(name = "wiki-harvest")]
#[command(about = "Collects game and character records from fandom wikis")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crawl once and exit
    Crawl(CrawlArgs),
    /// Run the HTTP control API
    Serve(ServeArgs),
}

#[derive(ClapArgs, Debug)]
pub struct CrawlArgs {
    /// Game page to start from
    #[arg(short, long, conflicts_with = "preset")]
    pub url: Option<String>,

    /// Crawl the built-in list of game wikis
    #[arg(long)]
    pub preset: bool,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Minimum milliseconds between requests to one domain
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Output collection file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Run report file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// WebDriver endpoint (overrides WEBDRIVER_URL)
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// Maximum concurrent browser sessions
    #[arg(long)]
    pub max_sessions: Option<usize>,
}

#[derive(ClapArgs, Debug)]
pub struct ServeArgs {
    /// Address to listen on, e.g. 127.0.0.1:8000
    #[arg(short, long)]
    pub bind: Option<String>,

    /// JSON server configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl CrawlArgs {
    /// Layers the configuration: file (or defaults), then environment, then flags
    pub fn into_config(self) -> Result<CrawlConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => CrawlConfig::from_file(path)?,
            None => CrawlConfig::new(SeedMode::Preset),
        };
        config.apply_env();

        if let Some(url) = self.url {
            config.seeds = SeedMode::Single { url };
        } else if self.preset {
            config.seeds = SeedMode::Preset;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.domain_delay_ms = delay_ms;
        }
        if let Some(output) = self.output {
            config.output_path = output;
        }
        if let Some(report) = self.report {
            config.report_path = report;
        }
        if let Some(webdriver_url) = self.webdriver_url {
            config.webdriver_url = webdriver_url;
        }
        if let Some(max_sessions) = self.max_sessions {
            config.max_sessions = max_sessions;
        }
        Ok(config)
    }
}

impl ServeArgs {
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        config.crawl.apply_env();
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crawl_args(argv: &[&str]) -> CrawlArgs {
        match Args::try_parse_from(argv).unwrap().command {
            Command::Crawl(args) => args,
            Command::Serve(_) => panic!("expected crawl"),
        }
    }

    #[test]
    fn test_crawl_flags_override_defaults() {
        let config = crawl_args(&[
            "wiki-harvest",
            "crawl",
            "--url",
            "https://example.fandom.com/wiki/Demo_Game",
            "--delay-ms",
            "250",
            "--output",
            "out.json",
        ])
        .into_config()
        .unwrap();

        assert_eq!(
            config.seeds,
            SeedMode::Single {
                url: "https://example.fandom.com/wiki/Demo_Game".to_string()
            }
        );
        assert_eq!(config.domain_delay_ms, 250);
        assert_eq!(config.output_path, PathBuf::from("out.json"));
    }

    #[test]
    fn test_crawl_defaults_to_preset() {
        let config = crawl_args(&["wiki-harvest", "crawl"]).into_config().unwrap();
        assert_eq!(config.seeds, SeedMode::Preset);
    }

    #[test]
    fn test_url_conflicts_with_preset() {
        let parsed = Args::try_parse_from([
            "wiki-harvest",
            "crawl",
            "--preset",
            "--url",
            "https://example.fandom.com/wiki/Demo_Game",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_serve_bind_override() {
        let args = match Args::try_parse_from(["wiki-harvest", "serve", "--bind", "0.0.0.0:9000"])
            .unwrap()
            .command
        {
            Command::Serve(args) => args,
            Command::Crawl(_) => panic!("expected serve"),
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.cors_origins.len(), 3);
    }
}
