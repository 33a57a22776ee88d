//! Command-line surface: expand inputs, pick a producer, run one batch.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::config::{Config, ConfigManager, CONFIG_PATH_ENV, DEFAULT_CONFIG_FILE};
use crate::keywords::Vocabulary;
use crate::llm::OpenAiClient;
use crate::processor::{BatchProcessor, BatchReport, RetryPolicy};
use crate::producer::{MetadataProducer, Producer, PromptRepository, PromptTemplate, StatProducer};
use crate::profiles::{merge_contexts, ProfileManager};
use crate::usage::{write_usage_csv, PricingTable, SharedTracker, TrackedClient, UsageTracker};

/// Generate and cache metadata for media files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(long, env = CONFIG_PATH_ENV, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Recompute results even when a cached entry exists
    #[arg(long)]
    pub force_reprocess: bool,

    /// Never call the LLM; record basic file metadata instead
    #[arg(long)]
    pub offline: bool,

    /// Write per-call token usage to this CSV file
    #[arg(long)]
    pub usage_csv: Option<PathBuf>,

    /// Extra context added to every prompt
    #[arg(long)]
    pub context: Option<String>,

    /// Saved context profile to prepend, by name or slug
    #[arg(long)]
    pub profile: Option<String>,

    /// Prompt template file name inside the configured prompts directory
    #[arg(long)]
    pub prompt: Option<String>,

    /// Files or directories to process
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Expand directory arguments to their immediate regular files, sorted.
///
/// Other arguments are passed through untouched so that missing inputs
/// still reach the batch processor and get logged there.
pub fn expand_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut expanded = Vec::new();
    for path in paths {
        if !path.is_dir() {
            expanded.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            match entry {
                Ok(entry) if entry.file_type().is_file() => expanded.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping entry in {}: {}", path.display(), e),
            }
        }
    }
    expanded
}

fn pricing_table(config: &Config) -> PricingTable {
    let mut table = PricingTable::with_known_models();
    table.extend(&config.pricing);
    table
}

/// Profile context (if `--profile` names one) merged with `--context`.
pub async fn operator_context(config: &Config, args: &Args) -> anyhow::Result<String> {
    let profile = match &args.profile {
        Some(name) => {
            let profiles = ProfileManager::open(&config.profiles_dir).await?;
            let profile = profiles.find(name).await?.with_context(|| {
                format!(
                    "profile '{}' not found in {}",
                    name,
                    profiles.dir().display()
                )
            })?;
            tracing::info!("Using context profile '{}'", profile.name);
            Some(profile)
        }
        None => None,
    };
    Ok(merge_contexts(
        profile.as_ref(),
        args.context.as_deref().unwrap_or("").trim(),
    ))
}

/// `--prompt` from the prompts directory, else `prompt_path`, else the built-in.
pub async fn select_template(
    config: &Config,
    prompt: Option<&str>,
) -> anyhow::Result<Option<PromptTemplate>> {
    if let Some(file_name) = prompt {
        let dir = config
            .prompts_dir
            .as_deref()
            .context("--prompt needs prompts_dir in the config")?;
        let repository = PromptRepository::load(dir).await?;
        let template = repository.get(file_name).cloned().with_context(|| {
            let known: Vec<_> = repository.iter().map(|(name, _)| name).collect();
            format!(
                "prompt '{}' not found in {} (available: {})",
                file_name,
                dir.display(),
                known.join(", ")
            )
        })?;
        return Ok(Some(template));
    }
    match &config.prompt_path {
        Some(path) => Ok(Some(PromptTemplate::load(path).await?)),
        None => Ok(None),
    }
}

async fn metadata_producer(
    config: &Config,
    api_key: String,
    tracker: SharedTracker,
    template: Option<PromptTemplate>,
    context: String,
) -> anyhow::Result<MetadataProducer> {
    let client = OpenAiClient::with_base_url(api_key, config.api_base_url.as_str());
    let mut producer = MetadataProducer::new(
        TrackedClient::new(Arc::new(client), tracker),
        config.default_model.as_str(),
        config.default_creativity,
    )
    .with_context(context);

    if let Some(template) = template {
        tracing::info!("Using prompt template '{}'", template.name);
        producer = producer.with_template(template);
    }
    if let Some(path) = &config.vocabulary_path {
        let vocabulary = Vocabulary::load(path).await?;
        producer = producer.with_vocabulary(Arc::new(vocabulary));
    }
    Ok(producer)
}

/// `Processed files:` listing, or a note that nothing was processed.
pub fn render_report(report: &BatchReport) -> String {
    if report.is_empty() {
        return "No files were processed.".to_string();
    }
    let mut out = String::from("Processed files:");
    for result in report.iter() {
        out.push_str(&format!(
            "\n- {}: {} ({})",
            result.file_name,
            result.cache_path.display(),
            result.outcome
        ));
    }
    out
}

fn config_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}

/// Run one batch. Item failures are logged, never returned.
pub async fn run(args: Args, cancel: CancellationToken) -> anyhow::Result<()> {
    let config = ConfigManager::load(&args.config)
        .await
        .with_context(|| format!("loading config {}", args.config.display()))?
        .into_config()
        .with_base_dir(config_dir(&args.config));

    let inputs = expand_paths(&args.paths);
    let context = operator_context(&config, &args).await?;

    let api_key = if args.offline { None } else { config.api_key() };
    let (producer, tracker): (Arc<dyn Producer>, Option<SharedTracker>) = match api_key {
        Some(key) => {
            let tracker: SharedTracker = Arc::new(Mutex::new(UsageTracker::new(
                pricing_table(&config),
                config.default_model.as_str(),
            )));
            let template = select_template(&config, args.prompt.as_deref()).await?;
            let producer =
                metadata_producer(&config, key, Arc::clone(&tracker), template, context).await?;
            (Arc::new(producer) as Arc<dyn Producer>, Some(tracker))
        }
        None => {
            if !args.offline {
                tracing::warn!("No API key configured; recording file metadata only");
            }
            (Arc::new(StatProducer) as Arc<dyn Producer>, None)
        }
    };

    let processor = BatchProcessor::new(
        &config.cache_dir,
        &config.log_path,
        producer,
        RetryPolicy::new(config.max_retries, config.retry_delay_secs),
    )
    .await?
    .with_cancellation(cancel);

    let report = processor.process(&inputs, args.force_reprocess).await;
    println!("{}", render_report(&report));

    if let Some(tracker) = tracker {
        let (records, footer) = {
            let tracker = tracker.lock().unwrap_or_else(|p| p.into_inner());
            tracker.print_summary();
            (tracker.records().to_vec(), tracker.csv_footer_comment())
        };
        if let Some(path) = &args.usage_csv {
            write_usage_csv(path, &records, Some(&footer))
                .await
                .with_context(|| format!("writing usage CSV {}", path.display()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{ProcessingOutcome, ProcessingResult};
    use crate::profiles::Profile;
    use tempfile::TempDir;

    #[test]
    fn test_expand_paths_lists_directory_files_sorted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.jpg"), "b").unwrap();
        std::fs::write(dir.path().join("a.jpg"), "a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.jpg"), "c").unwrap();
        let missing = dir.path().join("missing.mov");

        let expanded = expand_paths(&[dir.path().to_path_buf(), missing.clone()]);

        assert_eq!(
            expanded,
            vec![dir.path().join("a.jpg"), dir.path().join("b.jpg"), missing]
        );
    }

    #[test]
    fn test_render_report() {
        assert_eq!(render_report(&BatchReport::default()), "No files were processed.");

        let mut report = BatchReport::default();
        report.insert(ProcessingResult {
            file_name: "a.jpg".into(),
            cache_path: PathBuf::from("cache/a.jpg.json"),
            outcome: ProcessingOutcome::Reprocessed,
            invoked: true,
        });
        assert_eq!(
            render_report(&report),
            "Processed files:\n- a.jpg: cache/a.jpg.json (reprocessed)"
        );
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "firekey",
            "--force-reprocess",
            "--usage-csv",
            "usage.csv",
            "a.jpg",
            "b.jpg",
        ])
        .unwrap();

        assert!(args.force_reprocess);
        assert!(!args.offline);
        assert_eq!(args.usage_csv, Some(PathBuf::from("usage.csv")));
        assert_eq!(args.paths.len(), 2);
        assert_eq!(args.context, None);
        assert!(Args::try_parse_from(["firekey"]).is_err());
    }

    #[test]
    fn test_args_parse_context_options() {
        let args = Args::try_parse_from([
            "firekey",
            "--context",
            "Shot in Norway",
            "--profile",
            "Outdoor Brand",
            "--prompt",
            "editorial.txt",
            "a.jpg",
        ])
        .unwrap();

        assert_eq!(args.context.as_deref(), Some("Shot in Norway"));
        assert_eq!(args.profile.as_deref(), Some("Outdoor Brand"));
        assert_eq!(args.prompt.as_deref(), Some("editorial.txt"));
    }

    fn args_for(config: PathBuf, paths: Vec<PathBuf>) -> Args {
        Args {
            config,
            force_reprocess: false,
            offline: true,
            usage_csv: None,
            context: None,
            profile: None,
            prompt: None,
            paths,
        }
    }

    #[tokio::test]
    async fn test_operator_context_merges_profile_and_text() {
        let dir = TempDir::new().unwrap();
        let config = Config::default().with_base_dir(dir.path());
        let profiles = ProfileManager::open(&config.profiles_dir).await.unwrap();
        profiles
            .save(&Profile::new("Outdoor Brand", "Outdoor gear brand."), None)
            .await
            .unwrap();

        let mut args = args_for(dir.path().join("config.json"), vec![]);
        args.profile = Some("outdoor-brand".into());
        args.context = Some(" Shot in Norway ".into());

        assert_eq!(
            operator_context(&config, &args).await.unwrap(),
            "Outdoor gear brand.\n\nShot in Norway"
        );

        args.profile = Some("Unknown".into());
        let err = operator_context(&config, &args).await.unwrap_err();
        assert!(err.to_string().contains("profile 'Unknown' not found"));
    }

    #[tokio::test]
    async fn test_select_template_prefers_prompt_flag() {
        let dir = TempDir::new().unwrap();
        let prompts = dir.path().join("prompts");
        std::fs::create_dir(&prompts).unwrap();
        std::fs::write(
            prompts.join("editorial.txt"),
            r#"{"name": "Editorial", "system_prompt": "S", "user_prompt": "U"}"#,
        )
        .unwrap();
        let config = Config {
            prompts_dir: Some(prompts),
            ..Default::default()
        };

        let chosen = select_template(&config, Some("editorial.txt")).await.unwrap();
        assert_eq!(chosen.unwrap().name, "Editorial");
        assert!(select_template(&config, None).await.unwrap().is_none());
        let err = select_template(&config, Some("stock.txt")).await.unwrap_err();
        assert!(err.to_string().contains("available: editorial.txt"));
        assert!(select_template(&Config::default(), Some("editorial.txt"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_offline_run_populates_cache() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("file_a.txt");
        std::fs::write(&input, "Hello").unwrap();
        let config_path = dir.path().join("config.json");

        let args = args_for(
            config_path.clone(),
            vec![input, dir.path().join("missing.txt")],
        );
        run(args, CancellationToken::new()).await.unwrap();

        assert!(config_path.exists());
        assert!(dir.path().join("cache").join("file_a.txt.json").exists());
        let log = std::fs::read_to_string(dir.path().join("logs/firekey-errors.txt")).unwrap();
        assert!(log.contains("does not exist; skipping processing."));
    }

    #[tokio::test]
    async fn test_run_rejects_unknown_profile() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("file_a.txt");
        std::fs::write(&input, "Hello").unwrap();

        let mut args = args_for(dir.path().join("config.json"), vec![input]);
        args.profile = Some("missing".into());

        assert!(run(args, CancellationToken::new()).await.is_err());
        assert!(!dir.path().join("cache").join("file_a.txt.json").exists());
    }
}
