// rehearse - Rehearse a theatre scene with narrated partner lines

mod audio;
mod casting;
mod config;
mod controller;
mod import;
mod prepare;
mod render;
mod scene;
mod session;
mod tts;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use audio::RodioPlayer;
use casting::Casting;
use config::RehearseConfig;
use controller::Timing;
use prepare::PrepareOptions;
use scene::{Scene, SceneSource};
use session::{Outcome, Rehearsal, ViewOptions};
use tts::TtsBackend;

#[derive(Parser, Debug)]
#[command(name = "rehearse")]
#[command(about = "Rehearse a theatre scene: your lines stay hidden until you say them", long_about = None)]
#[command(version)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract the text of a PDF script
    Import {
        /// PDF file
        pdf: PathBuf,

        /// Output file (default: raw_extracts/<name>.txt)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert an edited script text into a scene file
    Parse {
        /// Script text with one `NAME. line` cue per paragraph
        script: PathBuf,

        /// Output file (default: <scenes_dir>/<name>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List available scenes and their speakers
    Scenes,

    /// Show the voice of each speaker, or the backend's voices
    Voices {
        /// Scene name or path
        scene: Option<String>,
    },

    /// Generate narration audio for one scene, or for every scene
    Prepare {
        /// Scene name or path
        scene: Option<String>,

        /// Regenerate audio that already exists
        #[arg(short, long)]
        force: bool,

        /// TTS backend to use
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Rehearse a scene
    Run {
        /// Scene name or path
        scene: String,

        /// The role you are playing
        #[arg(short, long)]
        role: String,

        /// Ignore narration audio
        #[arg(short, long)]
        mute: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Key to set
        key: String,
        /// New value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = RehearseConfig::load().context("Failed to load configuration")?;
    log::debug!("Configuration: {:?}", config);

    match args.command {
        Commands::Import { pdf, output } => {
            let path = import::import_pdf(&pdf, output.as_deref())?;
            println!("Text extracted to: {}", path.display());
            println!("Edit it into scenes, then run `rehearse parse` on each one.");
        }
        Commands::Parse { script, output } => parse_command(&config, &script, output)?,
        Commands::Scenes => list_scenes(&config)?,
        Commands::Voices { scene } => match scene {
            Some(scene) => show_casting(&config, &scene)?,
            None => {
                let backend = tts::create_backend(&config.backend)?;
                list_voices(&*backend)?;
            }
        },
        Commands::Prepare {
            scene,
            force,
            backend,
        } => {
            let backend_name = backend.as_deref().unwrap_or(&config.backend);
            let backend = tts::create_backend(backend_name)?;
            prepare_command(&config, scene.as_deref(), force, &*backend).await?;
        }
        Commands::Run { scene, role, mute } => run_command(&config, &scene, &role, mute).await?,
        Commands::Config { action } => handle_config_command(&action)?,
    }

    Ok(())
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = RehearseConfig::load()?;
            println!("Configuration file: {:?}", RehearseConfig::config_path()?);
            println!();
            println!("backend = \"{}\"", config.backend);
            println!("scenes_dir = \"{}\"", config.scenes_dir);
            println!("prepared_dir = \"{}\"", config.prepared_dir);
            println!("casting_file = \"{}\"", config.casting_file);
            println!("silent_delay_ms = {}", config.silent_delay_ms);
            println!("failure_grace_ms = {}", config.failure_grace_ms);
            println!("max_alias_depth = {}", config.max_alias_depth);
            println!("context_before = {}", config.context_before);
            println!("context_after = {}", config.context_after);
        }
        ConfigAction::Set { key, value } => {
            if key == "backend" {
                // Validate backend exists
                tts::create_backend(value)?;
            }
            let mut config = RehearseConfig::load()?;
            config.set(key, value)?;
            config.save()?;
            println!("{} set to: {}", key, value);
        }
    }
    Ok(())
}

fn parse_command(config: &RehearseConfig, script: &Path, output: Option<PathBuf>) -> Result<()> {
    let text = std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read {}", script.display()))?;
    let records = scene::parse_script(&text);
    if records.is_empty() {
        bail!("No speaker cues found in {}", script.display());
    }

    let output = output.unwrap_or_else(|| {
        config
            .scenes_path()
            .join(format!("{}.json", scene::scene_name(script)))
    });
    scene::save_lines(&output, &records)?;

    let parsed = Scene::new(scene::scene_name(&output), records);
    println!(
        "{} lines written to {} ({})",
        parsed.len(),
        output.display(),
        parsed.speakers().join(", ")
    );
    Ok(())
}

fn list_scenes(config: &RehearseConfig) -> Result<()> {
    let dir = config.scenes_path();
    let paths = scene::list_scenes(&dir)?;
    if paths.is_empty() {
        println!("No scenes in {}", dir.display());
        return Ok(());
    }

    for path in paths {
        let name = scene::scene_name(&path);
        let (scene, source) = scene::resolve_scene(&name, config);
        let prepared = match source {
            SceneSource::Manifest(_) => format!(" [prepared, {} audio]", scene.audio_count()),
            SceneSource::Raw(_) => String::new(),
        };
        println!("{}{}", name, prepared);
        println!("  {} lines: {}", scene.len(), scene.speakers().join(", "));
    }
    Ok(())
}

fn load_scene(config: &RehearseConfig, name: &str) -> Result<Scene> {
    let (scene, source) = scene::resolve_scene(name, config);
    match &source {
        SceneSource::Manifest(path) => log::debug!("Using prepared scene {}", path.display()),
        SceneSource::Raw(path) => log::debug!("Using scene file {}", path.display()),
    }
    if scene.is_empty() {
        bail!("Scene {} is empty or could not be read", name);
    }
    Ok(scene)
}

fn show_casting(config: &RehearseConfig, name: &str) -> Result<()> {
    let scene = load_scene(config, name)?;
    let casting = Casting::load(&config.casting_path())?;

    println!("Voices for {}:", scene.name());
    let mut problems = 0;
    for speaker in scene.speakers() {
        match casting::resolve_voice(speaker, &casting, config.max_alias_depth) {
            Ok(voice) => println!("  {:<24} {}", speaker, voice),
            Err(e) => {
                problems += 1;
                println!("  {:<24} ERROR: {}", speaker, e);
            }
        }
    }

    if problems > 0 {
        bail!("{} speaker(s) have casting problems", problems);
    }
    Ok(())
}

fn list_voices(backend: &dyn TtsBackend) -> Result<()> {
    let voices = backend.list_voices()?;

    println!("Available voices for {} backend:", backend.name());
    println!();

    for voice in voices {
        let label = if voice.name == voice.id {
            voice.id
        } else {
            format!("{} [{}]", voice.name, voice.id)
        };
        match &voice.language {
            Some(lang) => println!("  {} ({})", label, lang),
            None => println!("  {}", label),
        }
    }

    Ok(())
}

async fn prepare_command(
    config: &RehearseConfig,
    scene: Option<&str>,
    force: bool,
    backend: &dyn TtsBackend,
) -> Result<()> {
    let names = match scene {
        Some(name) => vec![name.to_string()],
        None => scene::list_scenes(&config.scenes_path())?
            .iter()
            .map(|path| scene::scene_name(path))
            .collect(),
    };
    if names.is_empty() {
        bail!("No scenes to prepare in {}", config.scenes_path().display());
    }

    let casting = Casting::load(&config.casting_path())?;
    let prepared_dir = config.prepared_path();
    let options = PrepareOptions {
        prepared_dir: &prepared_dir,
        casting: &casting,
        max_alias_depth: config.max_alias_depth,
        force,
        show_progress: true,
    };

    eprintln!("Backend: {}", backend.name());
    for name in names {
        // Always start from the authored lines, never from an older manifest
        let path = {
            let as_path = PathBuf::from(&name);
            if as_path.is_file() {
                as_path
            } else {
                config.scenes_path().join(format!("{}.json", name))
            }
        };
        let records = scene::load_lines(&path);
        if records.is_empty() {
            log::warn!("Skipping {}: no lines", path.display());
            continue;
        }
        let scene = Scene::new(scene::scene_name(&path), records);

        eprintln!("Preparing {} ({} lines)...", scene.name(), scene.len());
        let report = prepare::prepare_scene(&scene, backend, &options).await?;
        eprintln!(
            "  {} synthesized, {} reused, {} silent, {} failed -> {}",
            report.synthesized,
            report.reused,
            report.silent,
            report.failed,
            prepare::manifest_path(&prepared_dir, scene.name()).display()
        );
    }

    Ok(())
}

async fn run_command(config: &RehearseConfig, name: &str, role: &str, mute: bool) -> Result<()> {
    let mut scene = load_scene(config, name)?;
    let Some(role) = scene.find_role(role).map(str::to_string) else {
        bail!(
            "Role {} does not appear in scene {}. Speakers: {}",
            role,
            scene.name(),
            scene.speakers().join(", ")
        );
    };

    if mute {
        scene = scene.without_audio();
    } else if scene.audio_count() == 0 {
        log::info!("No narration audio for this scene, run `rehearse prepare` to generate it");
    }

    let timing = Timing {
        silent_delay: config.silent_delay(),
        failure_grace: config.failure_grace(),
    };
    let view = ViewOptions {
        before: config.context_before,
        after: config.context_after,
    };

    println!("Rehearsing {} as {}", scene.name(), role);
    println!("Enter: verify / continue   s: skip   r: restart   q: quit");

    let (input_tx, input_rx) = mpsc::unbounded_channel();
    session::spawn_input_reader(std::io::BufReader::new(std::io::stdin()), input_tx);

    let rehearsal = Rehearsal::new(timing, view, Arc::new(RodioPlayer), std::io::stdout());
    let outcome = rehearsal.run(Arc::new(scene), &role, input_rx).await?;

    log::debug!("Rehearsal ended: {:?}", outcome);
    if outcome == Outcome::Quit {
        println!("Rehearsal stopped.");
    }
    Ok(())
}
