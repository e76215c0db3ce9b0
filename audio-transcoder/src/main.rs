use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use audio_transcoder::{AppConfig, AudioTranscoder, FfmpegEngine, InputRecord, OutputRecord};
use clap::Parser;
use futures::{StreamExt, stream};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tracing::{debug, info, warn};

/// Transcode newline-delimited JSON audio records with ffmpeg.
///
/// Each input line is one record carrying either `content` (base64 or a byte
/// array) or `path`. Each processed record is written to stdout as one JSON
/// line, in input order.
#[derive(Parser, Debug)]
#[command(name = "audio-transcoder", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "AUDIO_TRANSCODER_CONFIG")]
    config: Option<PathBuf>,

    /// Input file with one JSON record per line, or `-` for stdin
    #[arg(short, long, default_value = "-")]
    input: PathBuf,

    /// Maximum number of records transcoded at once (overrides the config)
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Skip the ffmpeg availability check
    #[arg(long)]
    skip_probe: bool,
}

/// What happened to one input line.
enum Outcome {
    Blank,
    Malformed,
    Dropped,
    Processed(OutputRecord),
}

#[derive(Debug, Default)]
struct Summary {
    processed: usize,
    dropped: usize,
    malformed: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    audio_transcoder::logging::init_logging(args.verbose, args.quiet)?;

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
        config = config.validate()?;
    }
    debug!(?config, "Loaded configuration");

    if !args.skip_probe {
        let version = FfmpegEngine::new(&config.engine).probe().await?;
        info!(ffmpeg = %version, "FFmpeg available");
    }

    let transcoder = Arc::new(AudioTranscoder::from_config(&config)?);

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = if args.input.as_os_str() == "-" {
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        let file = tokio::fs::File::open(&args.input)
            .await
            .with_context(|| format!("Failed to open {}", args.input.display()))?;
        Box::new(BufReader::new(file))
    };

    let summary = run(reader, transcoder, config.concurrency).await?;
    info!(
        processed = summary.processed,
        dropped = summary.dropped,
        malformed = summary.malformed,
        "Finished"
    );

    Ok(())
}

async fn run<R>(
    reader: R,
    transcoder: Arc<AudioTranscoder>,
    concurrency: usize,
) -> anyhow::Result<Summary>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let outcomes = read_lines(reader)
        .enumerate()
        .map(|(index, line)| {
            let transcoder = Arc::clone(&transcoder);
            tokio::spawn(async move {
                let line = line?;
                Ok::<_, std::io::Error>(handle_line(&transcoder, index + 1, &line).await)
            })
        })
        .buffered(concurrency);
    let mut outcomes = std::pin::pin!(outcomes);

    let mut stdout = tokio::io::stdout();
    let mut summary = Summary::default();

    while let Some(joined) = outcomes.next().await {
        let outcome = joined
            .context("Record task panicked")?
            .context("Failed to read input")?;

        match outcome {
            Outcome::Blank => {}
            Outcome::Malformed => summary.malformed += 1,
            Outcome::Dropped => summary.dropped += 1,
            Outcome::Processed(record) => {
                let mut line = serde_json::to_vec(&record.to_json())?;
                line.push(b'\n');
                stdout.write_all(&line).await?;
                stdout.flush().await?;
                summary.processed += 1;
            }
        }
    }

    Ok(summary)
}

async fn handle_line(transcoder: &AudioTranscoder, line_no: usize, line: &str) -> Outcome {
    if line.trim().is_empty() {
        return Outcome::Blank;
    }

    let record = match serde_json::from_str(line)
        .map_err(audio_transcoder::Error::from)
        .and_then(InputRecord::from_json)
    {
        Ok(record) => record,
        Err(e) => {
            warn!(line = line_no, "Skipping malformed record: {}", e);
            return Outcome::Malformed;
        }
    };

    match transcoder.process(&record).await {
        Some(output) => Outcome::Processed(output),
        None => {
            debug!(line = line_no, input = %record.describe(), "Record dropped");
            Outcome::Dropped
        }
    }
}

/// Lines of `reader` as a stream. A read error is yielded once and ends the stream.
fn read_lines<R>(reader: R) -> impl futures::Stream<Item = std::io::Result<String>>
where
    R: AsyncBufRead + Unpin,
{
    stream::unfold(Some(reader.lines()), |state: Option<Lines<R>>| async move {
        let mut lines = state?;
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(line), Some(lines))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
}
