//! Chunked upload client: encode a file and send it to a PixDrop server.
//!
//! Chunks go out sequentially with 1-based indices; a chunk that keeps
//! failing after its retry budget aborts the whole upload — there is no
//! skip-and-resume.

use anyhow::{Context, Result, anyhow, bail};
use base64::{Engine, engine::general_purpose::STANDARD};
use clap::Parser;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "pixdrop-send",
    about = "Send a file to a PixDrop server as base64 text chunks"
)]
struct Cli {
    /// Path of the file to upload
    #[arg(short, long)]
    file: String,
    /// Chunk endpoint, e.g. http://127.0.0.1:5000/api/upload/chunk
    #[arg(short, long)]
    server: String,
    /// Chunk size in characters of encoded text
    #[arg(short, long, default_value_t = 50_000)]
    chunk: usize,
    /// Upload id (random when omitted)
    #[arg(long)]
    id: Option<String>,
    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
    /// Attempts per chunk before the upload aborts
    #[arg(long, default_value_t = 3)]
    retries: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.chunk == 0 {
        bail!("chunk size must be at least 1");
    }

    let bytes = std::fs::read(&cli.file).with_context(|| format!("reading {}", cli.file))?;
    if bytes.is_empty() {
        bail!("{} is empty", cli.file);
    }

    let text = STANDARD.encode(&bytes);
    let total = text.len().div_ceil(cli.chunk);
    let upload_id = cli
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string()[..12].to_string());

    println!(
        "uploading {}: {} bytes, {} encoded chars, {} chunks of {}",
        cli.file,
        bytes.len(),
        text.len(),
        total,
        cli.chunk
    );
    println!("server: {}  upload id: {}", cli.server, upload_id);

    let client = Client::builder()
        .timeout(Duration::from_secs(cli.timeout))
        .build()?;

    for (i, chunk) in text.as_bytes().chunks(cli.chunk).enumerate() {
        let idx = i + 1;
        let reply = send_chunk(
            &client,
            &cli.server,
            &upload_id,
            idx,
            total,
            chunk,
            cli.retries,
        )
        .await
        .with_context(|| format!("chunk {idx}/{total} failed, aborting upload"))?;

        if idx < total {
            println!("chunk {idx}/{total} acknowledged");
        } else if let Some(url) = reply.get("imgUrl").and_then(Value::as_str) {
            println!("upload complete: {url}");
        } else {
            println!("upload complete: {reply}");
        }
    }

    Ok(())
}

/// Sends one chunk with bounded retries and an increasing delay between
/// attempts.
async fn send_chunk(
    client: &Client,
    server: &str,
    upload_id: &str,
    idx: usize,
    total: usize,
    chunk: &[u8],
    retries: u32,
) -> Result<Value> {
    let idx_param = idx.to_string();
    let total_param = total.to_string();
    let retries = retries.max(1);
    let mut last_error = None;

    for attempt in 1..=retries {
        let request = client
            .post(server)
            .query(&[
                ("id", upload_id),
                ("idx", idx_param.as_str()),
                ("total", total_param.as_str()),
            ])
            .body(chunk.to_vec());

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                return response.json::<Value>().await.map_err(Into::into);
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let body: String = body.chars().take(200).collect();
                eprintln!("chunk {idx}: server returned {status}: {body}");
                last_error = Some(anyhow!("server returned {status}"));
            }
            Err(err) => {
                eprintln!("chunk {idx}: {err}");
                last_error = Some(err.into());
            }
        }

        if attempt < retries {
            tokio::time::sleep(Duration::from_millis(1_500 * u64::from(attempt))).await;
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow!("max retries exceeded")))
}
