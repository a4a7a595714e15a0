mod render;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use kismet_core::config::{KismetConfig, VALID_IMAGE_PROVIDERS, VALID_LLM_PROVIDERS};
use kismet_core::error::KismetError;
use kismet_core::export::export_story;
use kismet_core::files::FileStore;
use kismet_core::imagegen::{ImageGenerator, ImageService};
use kismet_core::kind::{ContentKind, ImageKind, ProblemKind, RecipeKind, RefineKind, StoryKind};
use kismet_core::llm::LlmService;
use kismet_core::model::{
    ImageFilters, KeyElements, NoFilters, ProblemFilters, RecipeFilters, StoryInput,
};
use kismet_core::screen::Screen;
use kismet_core::state::Phase;
use kismet_core::storage::{open_from_config, Record, Repository};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "kismet",
    about = "Kismet: AI stories, recipes, images and coding problems",
    version
)]
enum Cli {
    /// Generate a story
    Story {
        /// What the story should be about
        prompt: Option<String>,
        #[arg(long)]
        genre: Option<String>,
        #[arg(long)]
        audience: Option<String>,
        /// Core premise in a sentence or two
        #[arg(long)]
        premise: Option<String>,
        #[arg(long)]
        protagonist: Option<String>,
        #[arg(long)]
        antagonist: Option<String>,
        #[arg(long)]
        setting: Option<String>,
        #[arg(long)]
        conflict: Option<String>,
        /// Theme (can be repeated)
        #[arg(long = "theme")]
        themes: Vec<String>,
        #[arg(long)]
        mood: Option<String>,
        /// Target length, e.g. "300 words"
        #[arg(long)]
        length: Option<String>,
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        language: Option<String>,
        /// Generate the story's illustrations
        #[arg(long)]
        images: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Generate a recipe (with a picture)
    Recipe {
        prompt: Option<String>,
        /// Cuisine or region
        #[arg(long)]
        region: Option<String>,
        /// Comma-separated key ingredients
        #[arg(long)]
        ingredients: Option<String>,
        /// Diet, allergies, equipment...
        #[arg(long)]
        consider: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Generate an image from keywords or a color palette
    Image {
        prompt: Option<String>,
        #[arg(long)]
        keywords: Option<String>,
        /// Hex color (can be repeated); switches to palette mode
        #[arg(long = "color")]
        colors: Vec<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Generate a data-structures-and-algorithms problem
    Problem {
        prompt: Option<String>,
        #[arg(long)]
        data_structure: Option<String>,
        #[arg(long)]
        algorithm: Option<String>,
        /// Language for the solution
        #[arg(long)]
        language: Option<String>,
        /// easy, medium, hard or random
        #[arg(long)]
        complexity: Option<String>,
        #[arg(long)]
        consider: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Rewrite a rough prompt into a clearer one
    Refine {
        prompt: String,
        #[arg(long)]
        json: bool,
    },
    /// Export a saved story as an HTML document
    Export {
        /// Saved story id
        id: i64,
        /// Output file (default: <files root>/exports/<title>.html)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List saved items
    Saved {
        kind: KindArg,
        /// Only items whose name contains this text
        #[arg(short, long)]
        search: Option<String>,
        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a saved item by id
    Show {
        kind: KindArg,
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Show the most recently saved item, or generate one when nothing is saved
    Last {
        kind: KindArg,
        #[arg(long)]
        json: bool,
    },
    /// Delete a saved item by name (title, recipe name or image prompt)
    Delete { kind: KindArg, key: String },
    /// Print saved items every time they change (Ctrl-C to stop)
    Watch {
        kind: KindArg,
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show the effective configuration
    Config,
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Save the result
    #[arg(long)]
    save: bool,
    /// Output the view as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Story,
    Recipe,
    Image,
    Problem,
}

/// Image generation, or the reason it is unavailable. The reason is only
/// reported when an image is requested.
enum Images {
    Service(ImageService),
    Unavailable(String),
}

impl Images {
    fn from_config(config: &KismetConfig) -> Self {
        match ImageService::from_config(&config.image) {
            Ok(service) => Images::Service(service),
            Err(e) => {
                tracing::debug!("image generation unavailable: {e}");
                Images::Unavailable(e.to_string())
            }
        }
    }
}

impl ImageGenerator for Images {
    async fn generate_image(&self, prompt: &str) -> kismet_core::Result<Option<Vec<u8>>> {
        match self {
            Images::Service(s) => s.generate_image(prompt).await,
            Images::Unavailable(reason) => Err(KismetError::Config(reason.clone())),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .compact()
        .init();

    let cli = Cli::parse();
    let config = KismetConfig::load(Some(&std::env::current_dir()?))
        .unwrap_or_else(|_| KismetConfig::default_config());

    run(cli, &config).await
}

async fn run(cli: Cli, config: &KismetConfig) -> Result<()> {
    match cli {
        Cli::Story {
            prompt,
            genre,
            audience,
            premise,
            protagonist,
            antagonist,
            setting,
            conflict,
            themes,
            mood,
            length,
            format,
            language,
            images,
            output,
        } => {
            let input = StoryInput {
                genre,
                target_audience: audience,
                core_premise: premise,
                key_elements: KeyElements {
                    protagonist,
                    antagonist,
                    setting,
                    conflict,
                    themes,
                    mood_tone: mood,
                },
                length,
                output_format: format,
                language,
            };
            cmd_generate(config, StoryKind::new(), input, prompt, images, &output).await
        }
        Cli::Recipe {
            prompt,
            region,
            ingredients,
            consider,
            output,
        } => {
            let filters = RecipeFilters {
                region,
                ingredients,
                other_considerations: consider,
            };
            cmd_generate(config, RecipeKind, filters, prompt, true, &output).await
        }
        Cli::Image {
            prompt,
            keywords,
            colors,
            output,
        } => {
            let palette = colors
                .iter()
                .map(|c| normalize_color(c))
                .collect::<Result<Vec<_>>>()?;
            let filters = ImageFilters { keywords, palette };
            let kind = ImageKind::new().with_model(config.image.model.clone());
            cmd_generate(config, kind, filters, prompt, true, &output).await
        }
        Cli::Problem {
            prompt,
            data_structure,
            algorithm,
            language,
            complexity,
            consider,
            output,
        } => {
            let filters = ProblemFilters {
                data_structure,
                algorithm,
                language,
                complexity,
                other_considerations: consider,
            };
            cmd_generate(config, ProblemKind, filters, prompt, false, &output).await
        }
        Cli::Refine { prompt, json } => {
            let output = OutputArgs { save: false, json };
            cmd_generate(config, RefineKind::new(), NoFilters, Some(prompt), false, &output).await
        }
        Cli::Export { id, out } => cmd_export(config, id, out).await,
        Cli::Saved { kind, search, json } => match kind {
            KindArg::Story => cmd_saved::<StoryKind>(config, search.as_deref(), json).await,
            KindArg::Recipe => cmd_saved::<RecipeKind>(config, search.as_deref(), json).await,
            KindArg::Image => cmd_saved::<ImageKind>(config, search.as_deref(), json).await,
            KindArg::Problem => cmd_saved::<ProblemKind>(config, search.as_deref(), json).await,
        },
        Cli::Show { kind, id, json } => match kind {
            KindArg::Story => cmd_show(config, StoryKind::new(), id, json).await,
            KindArg::Recipe => cmd_show(config, RecipeKind, id, json).await,
            KindArg::Image => cmd_show(config, ImageKind::new(), id, json).await,
            KindArg::Problem => cmd_show(config, ProblemKind, id, json).await,
        },
        Cli::Last { kind, json } => match kind {
            KindArg::Story => cmd_last(config, StoryKind::new(), json).await,
            KindArg::Recipe => cmd_last(config, RecipeKind, json).await,
            KindArg::Image => cmd_last(config, ImageKind::new(), json).await,
            KindArg::Problem => cmd_last(config, ProblemKind, json).await,
        },
        Cli::Delete { kind, key } => match kind {
            KindArg::Story => cmd_delete::<StoryKind>(config, &key).await,
            KindArg::Recipe => cmd_delete::<RecipeKind>(config, &key).await,
            KindArg::Image => cmd_delete::<ImageKind>(config, &key).await,
            KindArg::Problem => cmd_delete::<ProblemKind>(config, &key).await,
        },
        Cli::Watch { kind, search } => match kind {
            KindArg::Story => cmd_watch::<StoryKind>(config, search.as_deref()).await,
            KindArg::Recipe => cmd_watch::<RecipeKind>(config, search.as_deref()).await,
            KindArg::Image => cmd_watch::<ImageKind>(config, search.as_deref()).await,
            KindArg::Problem => cmd_watch::<ProblemKind>(config, search.as_deref()).await,
        },
        Cli::Config => cmd_config(config),
    }
}

fn make_screen<K: ContentKind>(
    config: &KismetConfig,
    kind: K,
) -> Result<Screen<K, LlmService, Images>> {
    let storage = open_from_config(config).context("failed to open save store")?;
    let files = FileStore::new(config.files_root()?);
    let stale = files.purge_stale_sessions();
    if stale > 0 {
        tracing::debug!(stale, "removed leftover image caches");
    }
    let text = LlmService::from_config(&config.llm).context("failed to create text service")?;
    Ok(Screen::new(kind, text, Images::from_config(config), storage, &files))
}

fn make_repo<K: ContentKind>(config: &KismetConfig) -> Result<Repository<K::Record>> {
    let storage = open_from_config(config).context("failed to open save store")?;
    Ok(Repository::new(storage))
}

/// Wait until no image segment is still resolving.
async fn settle<K: ContentKind>(screen: &Screen<K, LlmService, Images>) {
    let mut rx = screen.subscribe();
    let settled = tokio::time::timeout(Duration::from_secs(180), rx.wait_for(|s| !s.secondary_loading)).await;
    if settled.is_err() {
        eprintln!("{}", "Timed out waiting for images.".yellow());
    }
}

async fn cmd_generate<K: ContentKind>(
    config: &KismetConfig,
    kind: K,
    filters: K::Filters,
    prompt: Option<String>,
    resolve_images: bool,
    output: &OutputArgs,
) -> Result<()> {
    let screen = make_screen(config, kind)?.with_filters(filters);

    let state = match prompt {
        Some(p) => screen.submit(&p).await,
        None => screen.refresh().await,
    };
    if state.phase == Phase::Error {
        bail!(state.error_message().unwrap_or("generation failed").to_string());
    }

    if resolve_images {
        if let Some(result) = &state.result {
            for (id, prompt) in result.unresolved_prompts() {
                screen.resolve_segment(id, prompt);
            }
        }
    }
    settle(&screen).await;

    if output.save {
        match screen.save().await {
            Ok(id) => eprintln!("{} {}", "Saved as".green(), id.to_string().cyan()),
            Err(e) => eprintln!("{} {}", "Not saved:".red(), e.user_message()),
        }
    }

    render::print_view(&screen.view(), screen.is_saved(), output.json)
}

async fn cmd_saved<K: ContentKind>(
    config: &KismetConfig,
    search: Option<&str>,
    json: bool,
) -> Result<()> {
    let repo = make_repo::<K>(config)?;
    let records = match search {
        Some(q) => repo.search(q).await?,
        None => repo.list_all().await?,
    };
    render::print_records(K::NAME, &records, json)
}

async fn cmd_show<K: ContentKind>(config: &KismetConfig, kind: K, id: i64, json: bool) -> Result<()> {
    let screen = make_screen(config, kind)?;
    screen
        .show_saved(id)
        .await
        .with_context(|| format!("no saved {} with id {id}", K::NAME))?;
    render::print_view(&screen.view(), screen.is_saved(), json)
}

async fn cmd_last<K: ContentKind>(config: &KismetConfig, kind: K, json: bool) -> Result<()> {
    let screen = make_screen(config, kind)?;
    let state = if config.screen.restore_last {
        screen.restore_or_generate().await
    } else {
        screen.refresh().await
    };
    if state.phase == Phase::Error {
        bail!(state.error_message().unwrap_or("generation failed").to_string());
    }
    settle(&screen).await;
    render::print_view(&screen.view(), screen.is_saved(), json)
}

async fn cmd_delete<K: ContentKind>(config: &KismetConfig, key: &str) -> Result<()> {
    let repo = make_repo::<K>(config)?;
    let Some(record) = repo.get_by_key(key).await? else {
        bail!("no saved {} named '{key}'", K::NAME);
    };
    repo.delete(&record).await?;
    println!("{} {}", "Deleted".green(), record.natural_key());
    Ok(())
}

async fn cmd_export(config: &KismetConfig, id: i64, out: Option<PathBuf>) -> Result<()> {
    let repo = make_repo::<StoryKind>(config)?;
    let Some(story) = repo.get_by_id(id).await? else {
        bail!("no saved story with id {id}");
    };
    let out = match out {
        Some(path) if path.is_relative() => Some(std::env::current_dir()?.join(path)),
        other => other,
    };
    let files = FileStore::new(config.files_root()?);
    let path = export_story(&files, &story, out.as_deref())
        .await
        .context("failed to export story")?;
    println!("{} {}", "Exported to".green(), path.display());
    Ok(())
}

async fn cmd_watch<K: ContentKind>(config: &KismetConfig, search: Option<&str>) -> Result<()> {
    let repo = make_repo::<K>(config)?;
    let mut query = match search {
        Some(q) => repo.watch_search(q),
        None => repo.watch_all(),
    };
    loop {
        tokio::select! {
            next = query.next() => {
                let Some(records) = next else { break };
                println!("{}", format!("--- {} ---", chrono::Local::now().format("%H:%M:%S")).dimmed());
                render::print_records(K::NAME, &records?, false)?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn cmd_config(config: &KismetConfig) -> Result<()> {
    let mut shown = config.clone();
    if shown.llm.api_key.is_some() {
        shown.llm.api_key = Some("***".to_string());
    }
    if shown.image.api_key.is_some() {
        shown.image.api_key = Some("***".to_string());
    }
    println!("{}", toml::to_string_pretty(&shown)?);

    println!("{}", "--- Resolved ---".dimmed());
    println!("  {}  {}", "Database:".dimmed(), config.database_path()?.display());
    println!("  {}  {}", "Images:".dimmed(), config.files_root()?.display());

    let warnings = shown.validate();
    if !warnings.is_empty() {
        println!();
        for w in &warnings {
            println!("{} {w}", "warning:".yellow());
        }
        println!(
            "  {} text: {}; image: {}",
            "valid providers".dimmed(),
            VALID_LLM_PROVIDERS.join(", "),
            VALID_IMAGE_PROVIDERS.join(", ")
        );
    }
    Ok(())
}

/// `#abc`, `abc`, `#aabbcc` or `aabbcc` to upper-case `#AABBCC`.
fn normalize_color(raw: &str) -> Result<String> {
    let hex = raw.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid color '{raw}': expected a hex value such as #1A2B3C");
    }
    let full = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
        6 => hex.to_string(),
        _ => bail!("invalid color '{raw}': expected 3 or 6 hex digits"),
    };
    Ok(format!("#{}", full.to_ascii_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_color() {
        assert_eq!(normalize_color("#1a2b3c").unwrap(), "#1A2B3C");
        assert_eq!(normalize_color("fff").unwrap(), "#FFFFFF");
        assert!(normalize_color("#12345").is_err());
        assert!(normalize_color("zzzzzz").is_err());
    }

    #[test]
    fn test_cli_parses_story_flags() {
        let cli = Cli::try_parse_from([
            "kismet", "story", "a lighthouse", "--genre", "Mystery", "--theme", "trust", "--theme",
            "loss", "--save",
        ])
        .unwrap();
        match cli {
            Cli::Story {
                prompt,
                genre,
                themes,
                output,
                ..
            } => {
                assert_eq!(prompt.as_deref(), Some("a lighthouse"));
                assert_eq!(genre.as_deref(), Some("Mystery"));
                assert_eq!(themes, vec!["trust", "loss"]);
                assert!(output.save);
                assert!(!output.json);
            }
            _ => panic!("expected story"),
        }
    }

    #[test]
    fn test_cli_parses_export() {
        let cli = Cli::try_parse_from(["kismet", "export", "7", "--out", "story.html"]).unwrap();
        match cli {
            Cli::Export { id, out } => {
                assert_eq!(id, 7);
                assert_eq!(out, Some(PathBuf::from("story.html")));
            }
            _ => panic!("expected export"),
        }
        assert!(Cli::try_parse_from(["kismet", "refine"]).is_err());
    }

    #[test]
    fn test_cli_parses_kind_argument() {
        let cli = Cli::try_parse_from(["kismet", "saved", "recipe", "--search", "rice"]).unwrap();
        assert!(matches!(
            cli,
            Cli::Saved {
                kind: KindArg::Recipe,
                search: Some(_),
                json: false
            }
        ));
    }
}
