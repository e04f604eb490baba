//! Command-line front end: `encode`/`decode` subcommands over the
//! `jp2k` library, with PNM (PGM/PPM) as the raw-sample interchange
//! format since it needs no external image-decoding crate.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jp2k::decoder::{DecodeOptions, Decoder};
use jp2k::dwt::FilterKind;
use jp2k::encoder::{EncodeOptions, Encoder};
use jp2k::image::{Component, ComponentParams, Image};
use jp2k::tier1::CodingOptions;
use jp2k::tier2::progression::ProgressionOrder;

#[derive(Parser)]
#[command(name = "jp2k", version, about = "JPEG 2000 Part 1 encoder/decoder")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Encodes a PGM/PPM image into a JP2 or raw codestream file.
  Encode {
    input: PathBuf,
    output: PathBuf,
    #[arg(long, default_value_t = 1024)]
    tile_width: u32,
    #[arg(long, default_value_t = 1024)]
    tile_height: u32,
    #[arg(long, default_value_t = 5)]
    levels: u32,
    #[arg(long)]
    lossless: bool,
    #[arg(long)]
    mct: bool,
    #[arg(long, default_value_t = 1)]
    layers: u32,
    #[arg(long, value_enum, default_value = "lrcp")]
    progression: ProgressionArg,
    #[arg(long)]
    sop: bool,
    #[arg(long)]
    eph: bool,
    #[arg(long)]
    max_bytes: Option<u64>,
    /// Write a bare codestream instead of a JP2 file.
    #[arg(long)]
    raw_codestream: bool,
  },
  /// Decodes a JP2 or raw codestream file into a PGM/PPM image.
  Decode {
    input: PathBuf,
    output: PathBuf,
    #[arg(long)]
    max_bytes: Option<u64>,
    #[arg(long)]
    max_layers: Option<u32>,
    #[arg(long)]
    max_resolution: Option<u32>,
    #[arg(long)]
    strict: bool,
  },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ProgressionArg {
  Lrcp,
  Rlcp,
  Rpcl,
  Pcrl,
  Cprl,
}

impl From<ProgressionArg> for ProgressionOrder {
  fn from(a: ProgressionArg) -> Self {
    match a {
      ProgressionArg::Lrcp => ProgressionOrder::Lrcp,
      ProgressionArg::Rlcp => ProgressionOrder::Rlcp,
      ProgressionArg::Rpcl => ProgressionOrder::Rpcl,
      ProgressionArg::Pcrl => ProgressionOrder::Pcrl,
      ProgressionArg::Cprl => ProgressionOrder::Cprl,
    }
  }
}

fn main() -> ExitCode {
  env_logger::init();
  let cli = Cli::parse();
  match run(cli) {
    Ok(()) => ExitCode::from(0),
    Err(err) => {
      eprintln!("jp2k: {err}");
      ExitCode::from(exit_code_for(&err))
    }
  }
}

/// Maps the error taxonomy to a process exit code: 1 for malformed
/// input, 2 for out-of-range parameters/resources, 3 for anything else
/// (I/O, CLI misuse).
fn exit_code_for(err: &jp2k::Error) -> u8 {
  use jp2k::ErrorKind::*;
  match err.kind {
    FormatInvalid | BitstreamCorrupted => 1,
    ParameterOutOfRange | ResourceExhausted => 2,
    ProgrammerError => 3,
  }
}

fn run(cli: Cli) -> jp2k::Result<()> {
  match cli.command {
    Command::Encode {
      input,
      output,
      tile_width,
      tile_height,
      levels,
      lossless,
      mct,
      layers,
      progression,
      sop,
      eph,
      max_bytes,
      raw_codestream,
    } => {
      let bytes = fs::read(&input).map_err(|e| jp2k::Error::format_invalid(format!("reading {}: {e}", input.display())))?;
      let image = read_pnm(&bytes)?;
      let options = EncodeOptions {
        tile_width,
        tile_height,
        levels,
        filter: if lossless { FilterKind::Reversible53 } else { FilterKind::Irreversible97 },
        progression: progression.into(),
        num_layers: layers,
        mct,
        sop,
        eph,
        max_bytes,
        coding_options: CodingOptions { segment_symbols: true, ..Default::default() },
        ..Default::default()
      };
      let encoder = Encoder::new(options);
      let out = if raw_codestream { encoder.encode_codestream(&image)? } else { encoder.encode(&image)? };
      fs::write(&output, out).map_err(|e| jp2k::Error::format_invalid(format!("writing {}: {e}", output.display())))?;
      log::info!("encoded {} -> {}", input.display(), output.display());
      Ok(())
    }
    Command::Decode { input, output, max_bytes, max_layers, max_resolution, strict } => {
      let bytes = fs::read(&input).map_err(|e| jp2k::Error::format_invalid(format!("reading {}: {e}", input.display())))?;
      let decoder = Decoder::new(DecodeOptions { max_bytes, max_layers, max_resolution, strict, ..Default::default() });
      let format = jp2k::detect_format(&bytes)?;
      let image = match format {
        jp2k::J2KFormat::Jp2 => decoder.decode(&bytes)?,
        jp2k::J2KFormat::J2k => decoder.decode_codestream(&bytes)?,
      };
      let pnm = write_pnm(&image)?;
      fs::write(&output, pnm).map_err(|e| jp2k::Error::format_invalid(format!("writing {}: {e}", output.display())))?;
      log::info!("decoded {} -> {}", input.display(), output.display());
      Ok(())
    }
  }
}

/// Reads a binary PGM (`P5`, one component) or PPM (`P6`, three
/// components) file into an [`Image`] with 8-bit unsigned samples.
fn read_pnm(bytes: &[u8]) -> jp2k::Result<Image> {
  let text_end = bytes.iter().position(|&b| b == b'\n').unwrap_or(0);
  let magic = &bytes[0..text_end.min(2)];
  let num_components = match magic {
    b"P5" => 1,
    b"P6" => 3,
    _ => return Err(jp2k::Error::format_invalid("expected a binary PGM (P5) or PPM (P6) file")),
  };

  let mut tokens = Vec::new();
  let mut pos = 2;
  while tokens.len() < 3 {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
      pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'#' {
      while pos < bytes.len() && bytes[pos] != b'\n' {
        pos += 1;
      }
      continue;
    }
    let start = pos;
    while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
      pos += 1;
    }
    tokens.push(std::str::from_utf8(&bytes[start..pos]).unwrap_or_default().to_string());
  }
  pos += 1; // single whitespace byte separating the header from sample data

  let width: u32 = tokens[0].parse().map_err(|_| jp2k::Error::format_invalid("invalid PNM width"))?;
  let height: u32 = tokens[1].parse().map_err(|_| jp2k::Error::format_invalid("invalid PNM height"))?;
  let max_val: u32 = tokens[2].parse().map_err(|_| jp2k::Error::format_invalid("invalid PNM maxval"))?;
  if max_val > 255 {
    return Err(jp2k::Error::parameter("only 8-bit PNM samples are supported"));
  }

  let params = ComponentParams { dx: 1, dy: 1, width, height, x0: 0, y0: 0, precision: 8, signed: false };
  let mut components = vec![Component::new(params); num_components];
  let expected = width as usize * height as usize * num_components;
  if bytes.len() < pos + expected {
    return Err(jp2k::Error::format_invalid("PNM sample data truncated"));
  }
  for y in 0..height {
    for x in 0..width {
      for (c, component) in components.iter_mut().enumerate() {
        let idx = pos + (y as usize * width as usize + x as usize) * num_components + c;
        component.set_sample(x, y, bytes[idx] as i32);
      }
    }
  }
  Ok(Image::new(0, 0, width, height, components))
}

/// Writes an [`Image`] back out as a binary PGM/PPM, clamping samples to
/// `0..=255` (8-bit output regardless of the component's own precision).
fn write_pnm(image: &Image) -> jp2k::Result<Vec<u8>> {
  let num_components = image.num_components();
  if num_components != 1 && num_components != 3 {
    return Err(jp2k::Error::parameter("PNM output only supports 1 or 3 components"));
  }
  let magic = if num_components == 1 { "P5" } else { "P6" };
  let mut out = format!("{magic}\n{} {}\n255\n", image.width(), image.height()).into_bytes();
  for y in 0..image.height() {
    for x in 0..image.width() {
      for component in &image.components {
        let v = component.sample(x, y).clamp(0, 255);
        out.push(v as u8);
      }
    }
  }
  Ok(out)
}
