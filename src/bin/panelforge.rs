use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use panelforge::{
    AspectRatio, CharacterRender, ForgeConfig, LocationBackdrop, PanelRequest, assemble_inputs,
    assemble_lineup, build_generation_prompt, green_screen, process_all_characters,
    process_character,
};

#[derive(Parser, Debug)]
#[command(name = "panelforge", version)]
struct Cli {
    /// JSON configuration file (defaults apply when omitted).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove the key backdrop from one render and calibrate it to its height.
    Key(KeyArgs),
    /// Process every character in a manifest and assemble the reference lineup.
    Lineup(LineupArgs),
    /// Write a solid key-color backdrop.
    GreenScreen(GreenScreenArgs),
    /// Print the first-iteration generator prompt.
    Prompt(PromptArgs),
}

#[derive(Parser, Debug)]
struct KeyArgs {
    /// Raw character render.
    #[arg(long = "in")]
    in_path: PathBuf,

    #[arg(long)]
    name: String,

    #[arg(long)]
    height_cm: u32,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct LineupArgs {
    /// Character manifest JSON.
    #[arg(long)]
    manifest: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct GreenScreenArgs {
    #[arg(long, default_value_t = 1024)]
    width: u32,

    #[arg(long, default_value_t = 1024)]
    height: u32,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct PromptArgs {
    /// Scene description.
    #[arg(long)]
    scene: String,

    /// Optional character manifest JSON.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Optional landscape location backdrop image.
    #[arg(long)]
    location: Option<PathBuf>,

    #[arg(long, default_value = "3:4")]
    aspect: AspectRatio,
}

/// `{"characters": [{"name": "Luna", "height_cm": 130, "image": "luna.png"}]}`.
/// Image paths are relative to the manifest.
#[derive(serde::Deserialize, Debug)]
struct Manifest {
    characters: Vec<ManifestEntry>,
}

#[derive(serde::Deserialize, Debug)]
struct ManifestEntry {
    name: String,
    height_cm: u32,
    image: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ForgeConfig::from_json_file(path)?,
        None => ForgeConfig::default(),
    };
    match cli.cmd {
        Command::Key(args) => cmd_key(&config, args),
        Command::Lineup(args) => cmd_lineup(&config, args),
        Command::GreenScreen(args) => cmd_green_screen(&config, args),
        Command::Prompt(args) => cmd_prompt(&config, args),
    }
}

fn cmd_key(config: &ForgeConfig, args: KeyArgs) -> anyhow::Result<()> {
    let raw = image::open(&args.in_path)
        .with_context(|| format!("decode '{}'", args.in_path.display()))?
        .to_rgba8();
    let reference = process_character(&args.name, args.height_cm, &raw, &config.compositor)?;
    save_png(&reference.processed_image, &args.out)
}

fn cmd_lineup(config: &ForgeConfig, args: LineupArgs) -> anyhow::Result<()> {
    let renders = load_manifest(&args.manifest)?;
    let refs = process_all_characters(&renders, &config.compositor, config.threads)?;
    let lineup = assemble_lineup(&refs, &config.lineup)?;
    for slot in &lineup.slots {
        eprintln!(
            "{} ({} cm): sprite {}x{} at ({}, {})",
            slot.name,
            slot.height_cm,
            slot.sprite.width,
            slot.sprite.height,
            slot.sprite.x,
            slot.sprite.y
        );
    }
    save_png(&lineup.image, &args.out)
}

fn cmd_green_screen(config: &ForgeConfig, args: GreenScreenArgs) -> anyhow::Result<()> {
    let gs = green_screen(args.width, args.height, config.compositor.key_color)?;
    ensure_parent(&args.out)?;
    gs.save(&args.out)
        .with_context(|| format!("write png '{}'", args.out.display()))?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_prompt(config: &ForgeConfig, args: PromptArgs) -> anyhow::Result<()> {
    let characters = match &args.manifest {
        Some(path) => {
            let renders = load_manifest(path)?;
            process_all_characters(&renders, &config.compositor, config.threads)?
        }
        None => Vec::new(),
    };
    let mut request = PanelRequest::new(args.scene)
        .with_characters(characters)
        .with_aspect_ratio(args.aspect);
    if let Some(path) = &args.location {
        let decoded =
            image::open(path).with_context(|| format!("decode '{}'", path.display()))?;
        request = request.with_location(LocationBackdrop::from_dynamic(&decoded)?);
    }
    let inputs = assemble_inputs(&request, &config.lineup)?;
    let prompt = build_generation_prompt(&request, &inputs, &[]);
    println!("{}", prompt.text);
    Ok(())
}

fn load_manifest(path: &Path) -> anyhow::Result<Vec<CharacterRender>> {
    let bytes = std::fs::read(path).with_context(|| format!("read '{}'", path.display()))?;
    let manifest: Manifest = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse manifest '{}'", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    manifest
        .characters
        .into_iter()
        .map(|entry| {
            let image_path = base.join(&entry.image);
            let raw = image::open(&image_path)
                .with_context(|| format!("decode '{}'", image_path.display()))?
                .to_rgba8();
            Ok(CharacterRender::new(entry.name, entry.height_cm, raw))
        })
        .collect()
}

fn ensure_parent(out: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    Ok(())
}

fn save_png(img: &image::RgbaImage, out: &Path) -> anyhow::Result<()> {
    ensure_parent(out)?;
    img.save(out)
        .with_context(|| format!("write png '{}'", out.display()))?;
    eprintln!("wrote {}", out.display());
    Ok(())
}
