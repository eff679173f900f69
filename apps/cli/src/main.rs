use std::{path::PathBuf, process::ExitCode};

use anyhow::{anyhow, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use enfermera_core::{
    bootstrap, messages, open_theme,
    settings::Settings,
    theme::{ThemeController, ThemePreference},
    AppConfig, AppRuntime, SearchController, SearchError, View,
};
use indicatif::ProgressBar;
use output::{OutputFormat, Renderer};
use progress::spinner;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

const COLORFGBG_ENV: &str = "COLORFGBG";

#[derive(Debug, Parser, Clone)]
#[command(
    name = "enfermera",
    version,
    about = "Research health topics with AI summaries grounded in web sources."
)]
struct Cli {
    /// Preferred renderer for command output.
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    /// Read settings from this TOML file instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the directory holding persisted preferences.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    /// Color scheme of the host terminal, used when no theme was saved.
    #[arg(long, global = true, value_enum)]
    ambient_theme: Option<ThemeArg>,
    /// Disable ANSI colors in CLI output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Suppress non-critical CLI output.
    #[arg(long, global = true)]
    quiet: bool,
    /// Disable progress indicators for long-running tasks.
    #[arg(long, global = true)]
    no_progress: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
enum Command {
    /// Search once and print the resulting view.
    Search {
        /// Health topic, e.g. `síntomas de la gripe`.
        #[arg(required = true, num_args = 1..)]
        topic: Vec<String>,
    },
    /// Read topics from stdin, one search per line (default).
    Interactive,
    /// Inspect or change the color theme.
    Theme {
        #[command(subcommand)]
        command: ThemeCommand,
    },
    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand, Clone)]
enum ThemeCommand {
    /// Print the active theme.
    Show,
    /// Switch between dark and light and persist the result.
    Toggle,
    /// Persist an explicit theme.
    Set {
        #[arg(value_enum)]
        theme: ThemeArg,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ThemeArg {
    Dark,
    Light,
}

impl From<ThemeArg> for ThemePreference {
    fn from(value: ThemeArg) -> Self {
        match value {
            ThemeArg::Dark => ThemePreference::Dark,
            ThemeArg::Light => ThemePreference::Light,
        }
    }
}

impl Cli {
    fn progress_enabled(&self) -> bool {
        !self.quiet && !self.no_progress
    }

    fn renderer(&self, theme: ThemePreference) -> Renderer {
        Renderer::new(self.format, theme, !self.no_color)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    if cli.no_color {
        colored::control::set_override(false);
    }

    match cli.command.clone().unwrap_or(Command::Interactive) {
        Command::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "enfermera", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Command::Theme { command } => {
            let mut theme = open_theme(&app_config(&cli)?).await?;
            handle_theme_command(command, &cli, &mut theme).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Search { topic } => {
            let runtime = bootstrap(app_config(&cli)?).await?;
            handle_search(topic.join(" ").trim(), &cli, &runtime).await
        }
        Command::Interactive => {
            let mut runtime = bootstrap(app_config(&cli)?).await?;
            interactive::run(&cli, &mut runtime).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn app_config(cli: &Cli) -> Result<AppConfig> {
    Ok(AppConfig {
        settings: Settings::load(cli.config.as_deref())?,
        state_dir: cli.state_dir.clone(),
        ambient_theme: ambient_theme(cli),
        ..AppConfig::default()
    })
}

/// `--ambient-theme` first, then the terminal's `COLORFGBG` hint.
fn ambient_theme(cli: &Cli) -> Option<ThemePreference> {
    cli.ambient_theme.map(ThemePreference::from).or_else(|| {
        std::env::var(COLORFGBG_ENV)
            .ok()
            .and_then(|value| ThemePreference::from_colorfgbg(&value))
    })
}

async fn handle_search(topic: &str, cli: &Cli, runtime: &AppRuntime) -> Result<ExitCode> {
    let controller = runtime.controller();
    controller.set_query(topic);
    let outcome = run_search(&controller, topic, cli).await;

    let renderer = cli.renderer(runtime.theme().current());
    print!("{}", renderer.view(&controller.snapshot())?);

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(error) => {
            debug!(target: "enfermera_cli", %error, "search did not complete");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn handle_theme_command(
    command: ThemeCommand,
    cli: &Cli,
    theme: &mut ThemeController,
) -> Result<()> {
    let current = match command {
        ThemeCommand::Show => theme.current(),
        ThemeCommand::Toggle => theme.toggle().await,
        ThemeCommand::Set { theme: choice } => theme.set(choice.into()).await,
    };
    print!("{}", cli.renderer(current).theme(current)?);
    Ok(())
}

/// Drives one search to completion, showing the spinner while the session
/// reports the Loading view.
async fn run_search(
    controller: &SearchController,
    topic: &str,
    cli: &Cli,
) -> Result<(), SearchError> {
    let mut updates = controller.subscribe();
    let search = controller.search(topic);
    tokio::pin!(search);

    let mut progress: Option<ProgressBar> = None;
    loop {
        tokio::select! {
            outcome = &mut search => {
                finish_spinner(progress.take());
                return outcome;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    let outcome = (&mut search).await;
                    finish_spinner(progress.take());
                    return outcome;
                }
                let view = updates.borrow_and_update().view();
                if view == View::Loading && progress.is_none() {
                    progress = spinner(cli.progress_enabled(), messages::LOADING);
                }
            }
        }
    }
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,enfermera_cli=info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .without_time()
        .with_ansi(!cli.no_color)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize logging: {error}"))
}

fn finish_spinner(spinner: Option<ProgressBar>) {
    if let Some(progress) = spinner {
        progress.finish_and_clear();
    }
}

mod interactive {
    use std::io::Write;

    use super::*;

    /// One line typed at the prompt.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Input<'a> {
        Quit,
        ToggleTheme,
        Help,
        Unknown(&'a str),
        Topic(&'a str),
    }

    impl<'a> Input<'a> {
        pub(crate) fn parse(line: &'a str) -> Self {
            match line.trim() {
                ":salir" | ":quit" | ":q" => Input::Quit,
                ":tema" | ":theme" => Input::ToggleTheme,
                ":ayuda" | ":help" => Input::Help,
                command if command.starts_with(':') => Input::Unknown(command),
                topic => Input::Topic(topic),
            }
        }
    }

    pub async fn run(cli: &Cli, runtime: &mut AppRuntime) -> Result<()> {
        let controller = runtime.controller();
        let mut renderer = cli.renderer(runtime.theme().current());

        if !cli.quiet {
            print!("{}", renderer.header(runtime.theme().current()));
        }
        print!("{}", renderer.view(&controller.snapshot())?);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            prompt(cli);
            let Some(line) = lines.next_line().await? else {
                break;
            };
            match Input::parse(&line) {
                Input::Quit => break,
                Input::ToggleTheme => {
                    let theme = runtime.theme_mut().toggle().await;
                    renderer.set_theme(theme);
                    print!("{}", renderer.theme(theme)?);
                }
                Input::Help => print!("{}", renderer.header(runtime.theme().current())),
                Input::Unknown(command) => {
                    info!(target: "enfermera_cli", command, "unknown command; try :ayuda");
                }
                Input::Topic(topic) => {
                    controller.set_query(topic);
                    if let Err(error) = run_search(&controller, topic, cli).await {
                        debug!(target: "enfermera_cli", %error, "search did not complete");
                    }
                    print!("{}", renderer.view(&controller.snapshot())?);
                }
            }
        }
        debug!(target: "enfermera_cli", "interactive session closed");
        Ok(())
    }

    fn prompt(cli: &Cli) {
        if cli.quiet {
            return;
        }
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "› ");
        let _ = stderr.flush();
    }

}

mod output {
    use std::fmt::Write;

    use anyhow::Result;
    use clap::ValueEnum;
    use colored::{Color, Colorize};
    use enfermera_core::{
        favicon, markdown, messages,
        theme::{Palette, ThemePreference},
        Article, SearchSessionState, View,
    };
    use serde::Serialize;
    use serde_json::{self, json};

    #[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
    pub enum OutputFormat {
        Html,
        Json,
        Markdown,
        Text,
    }

    #[derive(Copy, Clone, Debug)]
    pub struct Renderer {
        format: OutputFormat,
        palette: Palette,
    }

    #[derive(Debug, Serialize)]
    struct ArticleCard<'a> {
        title: &'a str,
        uri: &'a str,
        hostname: Option<String>,
        favicon: Option<String>,
    }

    impl<'a> From<&'a Article> for ArticleCard<'a> {
        fn from(article: &'a Article) -> Self {
            Self {
                title: &article.title,
                uri: &article.uri,
                hostname: favicon::hostname(&article.uri),
                favicon: favicon::favicon_url(&article.uri),
            }
        }
    }

    fn theme_label(theme: ThemePreference) -> &'static str {
        match theme {
            ThemePreference::Dark => "oscuro",
            ThemePreference::Light => "claro",
        }
    }

    impl Renderer {
        pub fn new(format: OutputFormat, theme: ThemePreference, color: bool) -> Self {
            let palette = Palette::for_theme(theme);
            Self {
                format,
                palette: if color { palette } else { palette.plain() },
            }
        }

        pub fn set_theme(&mut self, theme: ThemePreference) {
            let styled = self.palette.styled;
            self.palette = Palette::for_theme(theme);
            if !styled {
                self.palette = self.palette.plain();
            }
        }

        /// Banner printed once by the interactive loop. Text format only.
        pub fn header(&self, theme: ThemePreference) -> String {
            if self.format != OutputFormat::Text {
                return String::new();
            }
            let hints = format!(
                "tema {} · :tema cambia el tema · :salir termina",
                theme_label(theme)
            );
            format!(
                "{}  {}\n",
                self.bold(messages::APP_TITLE, self.palette.title),
                self.paint(&hints, self.palette.muted)
            )
        }

        pub fn theme(&self, theme: ThemePreference) -> Result<String> {
            Ok(match self.format {
                OutputFormat::Json => {
                    let payload = json!({ "theme": theme });
                    format!("{}\n", serde_json::to_string_pretty(&payload)?)
                }
                OutputFormat::Markdown => format!("Tema: **{}**\n", theme_label(theme)),
                OutputFormat::Html => {
                    markdown::to_html(&format!("Tema: **{}**\n", theme_label(theme)))
                }
                OutputFormat::Text => format!(
                    "Tema: {}\n",
                    self.bold(theme_label(theme), self.palette.accent)
                ),
            })
        }

        /// Renders whichever view the state selects.
        pub fn view(&self, state: &SearchSessionState) -> Result<String> {
            let view = state.view();
            Ok(match self.format {
                OutputFormat::Json => {
                    let cards: Vec<ArticleCard<'_>> =
                        state.articles.iter().map(ArticleCard::from).collect();
                    let payload = json!({
                        "view": view,
                        "query": state.query,
                        "isLoading": state.is_loading,
                        "hasSearched": state.has_searched,
                        "error": state.error,
                        "summary": state.summary,
                        "articles": cards,
                    });
                    format!("{}\n", serde_json::to_string_pretty(&payload)?)
                }
                OutputFormat::Markdown => markdown_view(state, view),
                OutputFormat::Html => markdown::to_html(&markdown_view(state, view)),
                OutputFormat::Text => self.text_view(state, view),
            })
        }

        fn text_view(&self, state: &SearchSessionState, view: View) -> String {
            let palette = &self.palette;
            let mut out = String::new();
            match view {
                View::Loading => {
                    let _ = writeln!(out, "{}", self.paint(messages::LOADING, palette.muted));
                }
                View::Error => {
                    let message = format!(
                        "{}{}",
                        messages::ERROR_PREFIX,
                        state.error.as_deref().unwrap_or_default()
                    );
                    let _ = writeln!(out, "{}", self.paint(&message, palette.error));
                }
                View::EmptyResults => {
                    let _ = writeln!(
                        out,
                        "{}",
                        self.bold(messages::NO_RESULTS_TITLE, palette.heading)
                    );
                    let _ = writeln!(out, "{}", self.paint(messages::NO_RESULTS_HINT, palette.muted));
                }
                View::Welcome => {
                    let _ = writeln!(out, "{}", self.bold(messages::WELCOME, palette.title));
                    let _ = writeln!(
                        out,
                        "{}",
                        self.paint(messages::SEARCH_PLACEHOLDER, palette.muted)
                    );
                }
                View::Results => {
                    let _ = write!(
                        out,
                        "{}\n\n{}",
                        self.bold(messages::SUMMARY_HEADING, palette.title),
                        markdown::to_terminal(&state.summary, palette)
                    );
                    let _ = write!(
                        out,
                        "\n{}\n\n",
                        self.bold(messages::ARTICLES_HEADING, palette.title)
                    );
                    for (index, article) in state.articles.iter().enumerate() {
                        let title = markdown::sanitize_terminal(&article.title);
                        let _ = writeln!(
                            out,
                            "{}. {}",
                            index + 1,
                            self.bold(&title, palette.strong)
                        );
                        if let Some(host) = favicon::hostname(&article.uri) {
                            let _ = writeln!(out, "   {}", self.paint(&host, palette.muted));
                        }
                        let uri = markdown::sanitize_terminal(&article.uri);
                        let _ = writeln!(out, "   {}", self.paint(&uri, palette.link));
                    }
                }
            }
            out
        }

        fn paint(&self, text: &str, color: Color) -> String {
            if self.palette.styled {
                text.color(color).to_string()
            } else {
                text.to_string()
            }
        }

        fn bold(&self, text: &str, color: Color) -> String {
            if self.palette.styled {
                text.color(color).bold().to_string()
            } else {
                text.to_string()
            }
        }
    }

    fn markdown_view(state: &SearchSessionState, view: View) -> String {
        let mut out = String::new();
        match view {
            View::Loading => {
                let _ = writeln!(out, "_{}_", escape(messages::LOADING));
            }
            View::Error => {
                let _ = writeln!(
                    out,
                    "**{}** {}",
                    escape(messages::ERROR_PREFIX.trim_end()),
                    escape(state.error.as_deref().unwrap_or_default())
                );
            }
            View::EmptyResults => {
                let _ = writeln!(out, "### {}\n", escape(messages::NO_RESULTS_TITLE));
                let _ = writeln!(out, "{}", escape(messages::NO_RESULTS_HINT));
            }
            View::Welcome => {
                let _ = writeln!(out, "### {}", escape(messages::WELCOME));
            }
            View::Results => {
                let _ = writeln!(out, "# {}\n", escape(messages::SUMMARY_HEADING));
                let _ = writeln!(out, "{}\n", markdown::sanitize_terminal(state.summary.trim_end()));
                let _ = writeln!(out, "# {}\n", escape(messages::ARTICLES_HEADING));
                for article in &state.articles {
                    let card = ArticleCard::from(article);
                    out.push_str("- ");
                    if let Some(icon) = &card.favicon {
                        let _ = write!(out, "![favicon](<{icon}>) ");
                    }
                    let _ = write!(
                        out,
                        "[{}](<{}>)",
                        escape(card.title),
                        markdown::sanitize_terminal(card.uri)
                    );
                    if let Some(host) = &card.hostname {
                        let _ = write!(out, " · {}", escape(host));
                    }
                    out.push('\n');
                }
            }
        }
        out
    }

    /// Backslash-escapes Markdown punctuation in plain text.
    fn escape(text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for ch in text.chars().filter(|c| !c.is_control()) {
            if ch.is_ascii_punctuation() {
                escaped.push('\\');
            }
            escaped.push(ch);
        }
        escaped
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::Value;

        fn results_state() -> SearchSessionState {
            SearchSessionState {
                query: "gripe".to_string(),
                summary: "## Resumen\n* punto1".to_string(),
                articles: vec![Article {
                    title: "A".to_string(),
                    uri: "http://a.com".to_string(),
                }],
                has_searched: true,
                ..SearchSessionState::default()
            }
        }

        fn plain(format: OutputFormat) -> Renderer {
            Renderer::new(format, ThemePreference::Light, false)
        }

        #[test]
        fn text_results_list_summary_then_cards() {
            let rendered = plain(OutputFormat::Text).view(&results_state()).unwrap();
            assert_eq!(
                rendered,
                "Resumen IA\n\nResumen\n\n• punto1\n\nArtículos Encontrados\n\n1. A\n   a.com\n   http://a.com\n"
            );
        }

        #[test]
        fn text_views_follow_state_precedence() {
            let renderer = plain(OutputFormat::Text);

            let welcome = renderer.view(&SearchSessionState::default()).unwrap();
            assert!(welcome.starts_with(messages::WELCOME));

            let loading = SearchSessionState {
                is_loading: true,
                error: Some("stale".to_string()),
                has_searched: true,
                ..SearchSessionState::default()
            };
            assert_eq!(renderer.view(&loading).unwrap(), format!("{}\n", messages::LOADING));

            let failed = SearchSessionState {
                error: Some(messages::BACKEND_UNAVAILABLE.to_string()),
                has_searched: true,
                ..SearchSessionState::default()
            };
            assert_eq!(
                renderer.view(&failed).unwrap(),
                format!("Error: {}\n", messages::BACKEND_UNAVAILABLE)
            );

            let empty = SearchSessionState {
                has_searched: true,
                ..SearchSessionState::default()
            };
            assert_eq!(
                renderer.view(&empty).unwrap(),
                format!("{}\n{}\n", messages::NO_RESULTS_TITLE, messages::NO_RESULTS_HINT)
            );
        }

        #[test]
        fn text_strips_escape_sequences_from_citations() {
            let mut state = results_state();
            state.articles[0].title = "A\u{1b}[31m rojo".to_string();
            let rendered = plain(OutputFormat::Text).view(&state).unwrap();
            assert!(!rendered.contains('\u{1b}'));
            assert!(rendered.contains("1. A[31m rojo"));
        }

        #[test]
        fn markdown_cards_link_title_and_favicon() {
            let rendered = plain(OutputFormat::Markdown).view(&results_state()).unwrap();
            assert!(rendered.starts_with("# Resumen IA\n\n## Resumen\n* punto1\n\n# Artículos Encontrados\n\n"));
            assert!(rendered.contains(
                "- ![favicon](<https://www.google.com/s2/favicons?domain=a.com&sz=32>) [A](<http://a.com>) · a\\.com\n"
            ));
        }

        #[test]
        fn html_escapes_titles_and_drops_raw_markup() {
            let mut state = results_state();
            state.summary = "Hola <script>alert(1)</script> mundo".to_string();
            state.articles[0].title = "<b>negrita</b>".to_string();

            let rendered = plain(OutputFormat::Html).view(&state).unwrap();
            assert!(rendered.contains("<h1>Resumen IA</h1>"));
            assert!(!rendered.contains("<script>"));
            assert!(!rendered.contains("<b>"));
            assert!(rendered.contains("&lt;b&gt;negrita&lt;/b&gt;"));
            assert!(rendered.contains("<a href=\"http://a.com\">"));
            assert!(rendered.contains("alt=\"favicon\""));
        }

        #[test]
        fn json_carries_view_and_article_cards() {
            let rendered = plain(OutputFormat::Json).view(&results_state()).unwrap();
            let payload: Value = serde_json::from_str(&rendered).unwrap();
            assert_eq!(payload["view"], "results");
            assert_eq!(payload["query"], "gripe");
            assert_eq!(payload["articles"][0]["hostname"], "a.com");
            assert_eq!(
                payload["articles"][0]["favicon"],
                "https://www.google.com/s2/favicons?domain=a.com&sz=32"
            );
            assert!(payload["error"].is_null());
        }

        #[test]
        fn theme_report_uses_spanish_labels() {
            let mut renderer = plain(OutputFormat::Text);
            assert_eq!(renderer.theme(ThemePreference::Dark).unwrap(), "Tema: oscuro\n");
            renderer.set_theme(ThemePreference::Dark);
            assert!(!renderer.palette.styled);

            let json = plain(OutputFormat::Json).theme(ThemePreference::Light).unwrap();
            let payload: Value = serde_json::from_str(&json).unwrap();
            assert_eq!(payload["theme"], "light");
        }
    }
}

mod progress {
    use std::time::Duration;

    use indicatif::{ProgressBar, ProgressStyle};

    pub fn spinner(message_enabled: bool, message: impl Into<String>) -> Option<ProgressBar> {
        if !message_enabled {
            return None;
        }
        let progress = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        progress.set_style(style);
        progress.set_message(message.into());
        progress.enable_steady_tick(Duration::from_millis(80));
        Some(progress)
    }
}
