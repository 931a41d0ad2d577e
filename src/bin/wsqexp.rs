use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use wsq_rs::{FrameInfo, WsqDecoder, WsqEncoder};

#[derive(Parser)]
#[command(
    name = "wsqexp",
    author,
    version,
    about = "WSQ fingerprint image codec",
    long_about = "Encode, decode and inspect WSQ (Wavelet Scalar Quantization) \
                  compressed 8-bit grayscale images.",
    after_help = "EXAMPLES:\n  \
        wsqexp encode -i print.raw -o print.wsq -w 500 -H 500 -b 0.75 --ppi 500\n  \
        wsqexp decode -i print.wsq -o print.pgm -f pgm\n  \
        wsqexp info -i print.wsq -e\n  \
        wsqexp comment -i print.wsq -o tagged.wsq -t \"capture station 4\""
)]
struct Cli {
    /// Increase log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode raw 8-bit grayscale pixels to WSQ
    #[command(visible_alias = "e")]
    Encode {
        #[arg(short, long, help = "Input raw pixel file")]
        input: PathBuf,

        #[arg(short, long, help = "Output WSQ file")]
        output: PathBuf,

        #[arg(short, long, help = "Image width")]
        width: u32,

        #[arg(short = 'H', long, help = "Image height")]
        height: u32,

        #[arg(short, long, default_value = "0.75", help = "Target bits per pixel")]
        bitrate: f32,

        #[arg(long, help = "Scanning resolution in pixels per inch")]
        ppi: Option<u32>,

        #[arg(short, long, help = "Comment text to embed (repeatable)")]
        comment: Vec<String>,
    },

    /// Decode a WSQ file to raw pixels or PGM
    #[command(visible_alias = "d")]
    Decode {
        #[arg(short, long, help = "Input WSQ file")]
        input: PathBuf,

        #[arg(short, long, help = "Output file")]
        output: PathBuf,

        #[arg(short, long, default_value = "raw", help = "Output format")]
        format: OutputFormat,
    },

    /// Show header, metadata and comments of a WSQ file
    #[command(visible_alias = "i")]
    Info {
        #[arg(short, long, help = "Input WSQ file")]
        input: PathBuf,

        #[arg(short, long, help = "Decode the image and show the coding tables")]
        extended: bool,
    },

    /// Insert a comment segment into a WSQ file without recoding it
    #[command(visible_alias = "c")]
    Comment {
        #[arg(short, long, help = "Input WSQ file")]
        input: PathBuf,

        #[arg(short, long, help = "Output WSQ file")]
        output: PathBuf,

        #[arg(short, long, help = "Comment text")]
        text: String,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Raw,
    Pgm,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    // Library records go through the `log` facade; the subscriber picks
    // them up through its log bridge.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Encode {
            input,
            output,
            width,
            height,
            bitrate,
            ppi,
            comment,
        } => encode_image(&input, &output, width, height, bitrate, ppi, &comment),
        Commands::Decode {
            input,
            output,
            format,
        } => decode_image(&input, &output, &format),
        Commands::Info { input, extended } => show_info(&input, extended),
        Commands::Comment {
            input,
            output,
            text,
        } => insert_comment(&input, &output, &text),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn encode_image(
    input: &PathBuf,
    output: &PathBuf,
    width: u32,
    height: u32,
    bitrate: f32,
    ppi: Option<u32>,
    comments: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let pixels = fs::read(input)?;

    let mut encoder = WsqEncoder::new();
    encoder.set_bitrate(bitrate);
    if let Some(ppi) = ppi {
        encoder.set_ppi(ppi);
    }
    for comment in comments {
        encoder.add_comment(comment.as_str());
    }

    let encoded = encoder.encode_to_vec(&pixels, &FrameInfo::grayscale(width, height))?;
    fs::write(output, &encoded)?;

    let achieved = encoded.len() as f64 * 8.0 / (f64::from(width) * f64::from(height));
    println!(
        "✓ Encoded {}x{} image to {:?} ({} bytes, {:.3} bpp, ratio {:.1}:1)",
        width,
        height,
        output,
        encoded.len(),
        achieved,
        pixels.len() as f64 / encoded.len() as f64
    );
    Ok(())
}

fn decode_image(
    input: &PathBuf,
    output: &PathBuf,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let image = wsq_rs::decode(&data)?;

    match format {
        OutputFormat::Raw => fs::write(output, &image.pixels)?,
        OutputFormat::Pgm => write_pgm(output, &image.pixels, image.width, image.height)?,
    }

    println!(
        "✓ Decoded {}x{} image to {:?}",
        image.width, image.height, output
    );
    Ok(())
}

fn show_info(input: &PathBuf, extended: bool) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;

    println!("File: {:?}", input);
    println!("Size: {} bytes", data.len());
    println!();

    let mut decoder = WsqDecoder::new(&data);
    decoder.read_header()?;
    if let Some(header) = decoder.frame_header() {
        println!("Format: WSQ");
        println!("  Dimensions: {}x{}", header.width, header.height);
        println!("  Shift:      {}", header.m_shift);
        println!("  Scale:      {}", header.r_scale);
        println!("  Encoder:    {}", header.wsq_encoder);
        if header.software != 0 {
            println!("  Software:   {:#06x}", header.software);
        }
        let bpp = data.len() as f64 * 8.0 / (f64::from(header.width) * f64::from(header.height));
        println!("  Bitrate:    {:.3} bpp", bpp);
    }
    match decoder.ppi() {
        Some(ppi) => println!("  Resolution: {} ppi", ppi),
        None => println!("  Resolution: unknown"),
    }

    if let Some(metadata) = decoder.metadata() {
        println!();
        println!("NISTCOM ({} entries):", metadata.len());
        for (name, value) in metadata.iter() {
            println!("  {} {}", name, value.unwrap_or(""));
        }
    }

    let comments = decoder.comments();
    if !comments.is_empty() {
        println!();
        println!("Comments ({}):", comments.len());
        for (index, comment) in comments.iter().enumerate() {
            if wsq_rs::NistCom::is_nistcom(comment) {
                println!("  [{}] NISTCOM, {} bytes", index, comment.len());
            } else {
                println!("  [{}] {}", index, String::from_utf8_lossy(comment));
            }
        }
    }

    if extended {
        let reader = decoder.reader();
        if let Some(transform) = reader.transform_table() {
            println!();
            println!(
                "Transform: {}-tap lowpass, {}-tap highpass",
                transform.lowpass.len(),
                transform.highpass.len()
            );
        }
        if let Some(quantization) = reader.quantization_table() {
            let live = quantization.q_bin.iter().filter(|&&q| q != 0.0).count();
            println!(
                "Quantization: {} of {} subbands coded, bin center {}",
                live,
                quantization.q_bin.len(),
                quantization.bin_center
            );
        }

        let image = decoder.decode()?;
        println!(
            "Decoded: {} pixels, {} comments",
            image.pixels.len(),
            image.comments.len()
        );
    }

    Ok(())
}

fn insert_comment(
    input: &PathBuf,
    output: &PathBuf,
    text: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let updated = wsq_rs::wsq::add_comment(&data, text.as_bytes())?;
    fs::write(output, &updated)?;
    println!("✓ Added {} byte comment to {:?}", text.len(), output);
    Ok(())
}

fn write_pgm(
    path: &PathBuf,
    pixels: &[u8],
    width: u32,
    height: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    use std::io::Write;
    let mut file = fs::File::create(path)?;

    writeln!(file, "P5")?;
    writeln!(file, "{} {}", width, height)?;
    writeln!(file, "255")?;
    file.write_all(pixels)?;

    Ok(())
}
