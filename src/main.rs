use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use dotenvy::dotenv;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{error, info, warn};

mod config;
mod llm;
mod story;
mod storybook;
#[cfg(test)]
mod testing;
mod utils;

use config::{Config, ImageProvider, THEME_POOL};
use llm::{ChatCompletionClient, DiffusionClient, GeminiImageClient, ImageRenderer, TextCompletion};
use story::{ContentSanitizer, StoryError, StoryRequest, SubstitutionTable};
use storybook::{
    new_storybook_id, AssemblyOptions, CancelFlag, StorybookAssembler, StorybookRecord,
    StorybookStore,
};
use utils::http::build_http_client;
use utils::logging::init_logging;
use utils::timing::{complete_generation_timer, start_generation_timer};

const DEFAULT_RANDOM_THEMES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
enum KeywordSource {
    Text(String),
    RandomThemes(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GenerateArgs {
    name: String,
    age: u32,
    keywords: KeywordSource,
    concurrency: Option<usize>,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    Generate(GenerateArgs),
    List { output_dir: Option<PathBuf> },
    Show { id: String, output_dir: Option<PathBuf> },
    Export { id: String, output_dir: Option<PathBuf> },
}

fn usage() -> &'static str {
    "Usage:\n  \
     storybook generate --name <NAME> --age <AGE> (--keywords <TEXT> | --random-themes [N]) [--concurrency <N>] [--output-dir <DIR>]\n  \
     storybook list [--output-dir <DIR>]\n  \
     storybook show <ID> [--output-dir <DIR>]\n  \
     storybook export <ID> [--output-dir <DIR>]"
}

fn take_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> anyhow::Result<&'a str> {
    *index += 1;
    args.get(*index)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn parse_generate_args(args: &[String]) -> anyhow::Result<GenerateArgs> {
    let mut name: Option<String> = None;
    let mut age: Option<u32> = None;
    let mut keywords: Option<KeywordSource> = None;
    let mut concurrency: Option<usize> = None;
    let mut output_dir: Option<PathBuf> = None;

    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--name" => {
                name = Some(take_value(args, &mut index, "--name")?.to_string());
            }
            "--age" => {
                let value = take_value(args, &mut index, "--age")?;
                age = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| anyhow!("Invalid --age value: {value}"))?,
                );
            }
            "--keywords" => {
                if keywords.is_some() {
                    return Err(anyhow!("Use either --keywords or --random-themes, not both"));
                }
                keywords = Some(KeywordSource::Text(
                    take_value(args, &mut index, "--keywords")?.to_string(),
                ));
            }
            "--random-themes" => {
                if keywords.is_some() {
                    return Err(anyhow!("Use either --keywords or --random-themes, not both"));
                }
                let count = match args.get(index + 1) {
                    Some(value) if !value.starts_with("--") => {
                        index += 1;
                        value
                            .parse::<usize>()
                            .map_err(|_| anyhow!("Invalid --random-themes value: {value}"))?
                    }
                    _ => DEFAULT_RANDOM_THEMES,
                };
                keywords = Some(KeywordSource::RandomThemes(count.max(1)));
            }
            "--concurrency" => {
                let value = take_value(args, &mut index, "--concurrency")?;
                concurrency = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| anyhow!("Invalid --concurrency value: {value}"))?
                        .max(1),
                );
            }
            "--output-dir" => {
                output_dir = Some(PathBuf::from(take_value(args, &mut index, "--output-dir")?));
            }
            "--help" | "-h" => return Err(anyhow!(usage())),
            other => {
                return Err(anyhow!("Unknown generate argument: {other}\n{}", usage()));
            }
        }
        index += 1;
    }

    Ok(GenerateArgs {
        name: name.ok_or_else(|| anyhow!("--name is required"))?,
        age: age.ok_or_else(|| anyhow!("--age is required"))?,
        keywords: keywords.ok_or_else(|| anyhow!("--keywords or --random-themes is required"))?,
        concurrency,
        output_dir,
    })
}

fn parse_output_dir_only(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    let mut output_dir = None;
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--output-dir" => {
                output_dir = Some(PathBuf::from(take_value(args, &mut index, "--output-dir")?));
            }
            other => return Err(anyhow!("Unknown argument: {other}\n{}", usage())),
        }
        index += 1;
    }
    Ok(output_dir)
}

fn parse_cli_args(args: &[String]) -> anyhow::Result<CliCommand> {
    let rest = args.get(2..).unwrap_or_default();
    match args.get(1).map(|value| value.as_str()) {
        Some("generate") => Ok(CliCommand::Generate(parse_generate_args(rest)?)),
        Some("list") => Ok(CliCommand::List {
            output_dir: parse_output_dir_only(rest)?,
        }),
        Some(command @ ("show" | "export")) => {
            let id = rest
                .first()
                .filter(|value| !value.starts_with("--"))
                .ok_or_else(|| anyhow!("{command} needs a storybook id\n{}", usage()))?
                .clone();
            let output_dir = parse_output_dir_only(&rest[1..])?;
            Ok(if command == "show" {
                CliCommand::Show { id, output_dir }
            } else {
                CliCommand::Export { id, output_dir }
            })
        }
        _ => Err(anyhow!(usage())),
    }
}

fn pick_random_themes<R: Rng + ?Sized>(rng: &mut R, count: usize) -> String {
    THEME_POOL
        .choose_multiple(rng, count.min(THEME_POOL.len()))
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

fn build_capabilities(
    config: &Config,
) -> anyhow::Result<(Arc<dyn TextCompletion>, Arc<dyn ImageRenderer>)> {
    let http = build_http_client(config.text_timeout().max(config.image_timeout()))?;
    let text: Arc<dyn TextCompletion> = Arc::new(ChatCompletionClient::new(
        http.clone(),
        &config.text_base_url,
        &config.text_api_key,
        &config.text_model,
        config.text_temperature,
        config.text_top_p,
        config.text_timeout(),
        config.capability_max_attempts,
    ));
    let image: Arc<dyn ImageRenderer> = match config.image_provider {
        ImageProvider::Diffusion => Arc::new(DiffusionClient::new(
            http,
            &config.diffusion_base_url,
            &config.diffusion_api_key,
            &config.diffusion_model,
            config.image_timeout(),
            config.capability_max_attempts,
        )),
        ImageProvider::Gemini => Arc::new(GeminiImageClient::new(
            http,
            &config.gemini_api_key,
            &config.gemini_image_model,
            config.image_timeout(),
            config.capability_max_attempts,
        )),
    };
    info!(
        "Capabilities: text={} image={} ({})",
        text.model_name(),
        config.image_provider.as_str(),
        image.model_name()
    );
    Ok((text, image))
}

fn load_sanitizer(config: &Config) -> anyhow::Result<ContentSanitizer> {
    let table = match &config.sanitizer_table_path {
        Some(path) => {
            let table = SubstitutionTable::from_yaml_file(path)?;
            info!(
                "Loaded {} substitutions from {}",
                table.entries().len(),
                path.display()
            );
            table
        }
        None => SubstitutionTable::default(),
    };
    ContentSanitizer::new(&table)
}

async fn run_generate(config: &Config, args: GenerateArgs) -> anyhow::Result<()> {
    let missing = config.missing_credentials();
    if !missing.is_empty() {
        return Err(StoryError::Input(format!("missing credentials: {}", missing.join(", "))).into());
    }

    let keywords = match args.keywords {
        KeywordSource::Text(text) => text,
        KeywordSource::RandomThemes(count) => {
            let themes = pick_random_themes(&mut rand::thread_rng(), count);
            info!("Random themes: {}", themes);
            themes
        }
    };
    let request = StoryRequest::new(args.name, args.age, keywords);
    request.validate()?;

    let (text, image) = build_capabilities(config)?;
    let assembler = StorybookAssembler::new(
        text,
        image,
        load_sanitizer(config)?,
        config.prompt_consistency,
    );

    let cancel = CancelFlag::default();
    let signal_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping before the next scene");
            signal_flag.cancel();
        }
    });
    let options = AssemblyOptions {
        concurrency: args.concurrency.unwrap_or(config.scene_concurrency).max(1),
        timeout: config.request_timeout(),
        cancel,
    };

    let id = new_storybook_id();
    let mut timer = start_generation_timer(&id, &request.name, request.age, &request.keywords);
    let storybook = match assembler.assemble(&id, &request, &options).await {
        Ok(storybook) => storybook,
        Err(err) => {
            complete_generation_timer(&mut timer, "error", Some(format!("{}: {}", err.stage(), err)));
            return Err(err.into());
        }
    };
    complete_generation_timer(
        &mut timer,
        "success",
        Some(format!("scenes={}", storybook.pages.len())),
    );

    let repaired = storybook.pages.iter().filter(|page| page.prompt.repaired).count();
    if repaired > 0 {
        warn!("{} of {} prompts were repaired", repaired, storybook.pages.len());
    }

    let store = StorybookStore::new(args.output_dir.unwrap_or_else(|| config.output_dir.clone()));
    match store.save(&storybook).await {
        Ok(saved) => {
            println!("{}", storybook.display_title());
            println!("  scenes:  {}", saved.record.scenes.len());
            println!("  record:  {}", saved.record_path.display());
            println!("  gallery: {}", saved.gallery_path.display());
            match &saved.pdf_path {
                Some(path) => println!("  pdf:     {}", path.display()),
                None => println!("  pdf:     export failed (see log)"),
            }
        }
        Err(err) => {
            warn!(
                "Storybook {} was generated but could not be saved: {:#}",
                storybook.id, err
            );
            println!("{}", storybook.display_title());
            for page in &storybook.pages {
                println!("  {:>2}. {}", page.scene.index, page.scene.text);
            }
        }
    }
    Ok(())
}

fn print_record(record: &StorybookRecord) {
    let content = record.export_content();
    println!("{}", record.display_title);
    println!("{}", content.title);
    println!("Character: {}", record.character_desc);
    for (position, scene) in content.scenes.iter().enumerate() {
        let image = content
            .image_paths
            .get(position)
            .map(String::as_str)
            .unwrap_or("-");
        println!("  {:>2}. {}\n      {}", position + 1, scene, image);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Config::load()?;
    let _guards = init_logging(&config.log_level, &config.logs_dir);

    let args: Vec<String> = std::env::args().collect();
    let command = parse_cli_args(&args)?;

    let result = match command {
        CliCommand::Generate(generate_args) => run_generate(&config, generate_args).await,
        CliCommand::List { output_dir } => {
            let store = StorybookStore::new(output_dir.unwrap_or_else(|| config.output_dir.clone()));
            let records = store.list().await?;
            if records.is_empty() {
                println!("No storybooks in {}", store.root().display());
            }
            for record in records {
                println!("{}", record.display_title);
            }
            Ok(())
        }
        CliCommand::Show { id, output_dir } => {
            let store = StorybookStore::new(output_dir.unwrap_or_else(|| config.output_dir.clone()));
            let record = store.load(&id).await?;
            print_record(&record);
            Ok(())
        }
        CliCommand::Export { id, output_dir } => {
            let store = StorybookStore::new(output_dir.unwrap_or_else(|| config.output_dir.clone()));
            let record = store.load(&id).await?;
            let path = store.export_pdf(&record).await?;
            println!("{}", path.display());
            Ok(())
        }
    };

    if let Err(err) = &result {
        error!("{:#}", err);
    }
    result
}
