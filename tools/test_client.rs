//! Test Prediction Client
//!
//! Generates synthetic retina-like images and posts them to a running
//! classifier service for smoke and latency testing.

use image::{ImageFormat, Rgb, RgbImage};
use rand::Rng;
use retina_classifier::{ImagePreprocessor, PredictionResponse};
use std::io::Cursor;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Synthetic image generator for testing
struct ImageGenerator {
    rng: rand::rngs::ThreadRng,
    image_counter: u64,
}

impl ImageGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            image_counter: 0,
        }
    }

    /// Dark background with a reddish disc, roughly like a fundus photograph
    fn generate_fundus(&mut self, size: u32) -> RgbImage {
        self.image_counter += 1;
        let center = size as f32 / 2.0;
        let radius = center * self.rng.gen_range(0.7..0.95);
        let tint: [u8; 3] = [
            self.rng.gen_range(150..230),
            self.rng.gen_range(60..120),
            self.rng.gen_range(20..60),
        ];

        let mut image = RgbImage::new(size, size);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let dx = x as f32 - center;
            let dy = y as f32 - center;
            let distance = (dx * dx + dy * dy).sqrt();
            *pixel = if distance < radius {
                let falloff = 1.0 - (distance / radius) * 0.5;
                let noise: i16 = self.rng.gen_range(-8..8);
                Rgb(tint.map(|c| (c as f32 * falloff) as i16 + noise).map(|c| c.clamp(0, 255) as u8))
            } else {
                Rgb([0, 0, 0])
            };
        }
        image
    }

    /// Uniform random noise
    fn generate_noise(&mut self, size: u32) -> RgbImage {
        self.image_counter += 1;
        RgbImage::from_fn(size, size, |_, _| {
            Rgb([self.rng.gen(), self.rng.gen(), self.rng.gen()])
        })
    }
}

/// Result of posting one sample
enum SampleOutcome {
    Predicted(PredictionResponse),
    Rejected { status: reqwest::StatusCode, body: String },
    Transport(reqwest::Error),
}

/// Post one encoded image to `/predict`. Transport errors are reported as an
/// outcome so a single dropped connection does not end the run.
async fn send_sample(
    client: &reqwest::Client,
    base_url: &str,
    file_name: String,
    bytes: Vec<u8>,
) -> SampleOutcome {
    let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
    let form = reqwest::multipart::Form::new().part("file", part);

    let response = match client
        .post(format!("{}/predict", base_url))
        .multipart(form)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return SampleOutcome::Transport(e),
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return SampleOutcome::Rejected { status, body };
    }
    match response.json::<PredictionResponse>().await {
        Ok(prediction) => SampleOutcome::Predicted(prediction),
        Err(e) => SampleOutcome::Transport(e),
    }
}

fn encode(image: &RgbImage, format: ImageFormat) -> anyhow::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format)?;
    Ok(bytes)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_client=info".parse()?),
        )
        .init();

    info!("Starting Test Prediction Client");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let base_url = args
        .get(1)
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|| "http://127.0.0.1:7000".to_string());
    let count: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(20);
    let noise_rate: f64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(0.1);
    let delay_ms: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        base_url = %base_url,
        count = count,
        noise_rate = noise_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = reqwest::Client::new();
    match client.get(format!("{}/health", base_url)).send().await {
        Ok(response) => info!(status = %response.status(), "Service reachable"),
        Err(e) => {
            warn!(error = %e, "Service unreachable. Running in dry-run mode.");
            return run_dry_mode(count, noise_rate).await;
        }
    }

    let mut generator = ImageGenerator::new();
    let mut rng = rand::thread_rng();
    let mut ok_count = 0u64;
    let mut failed_count = 0u64;
    let mut latencies = Vec::with_capacity(count as usize);

    for i in 0..count {
        let (image, kind) = if rng.gen_bool(noise_rate) {
            (generator.generate_noise(rng.gen_range(64..512)), "noise")
        } else {
            (generator.generate_fundus(rng.gen_range(256..768)), "fundus")
        };
        let format = if rng.gen_bool(0.5) {
            ImageFormat::Png
        } else {
            ImageFormat::Jpeg
        };
        let bytes = encode(&image, format)?;

        let file_name = format!("sample_{:04}.{}", i, format.extensions_str()[0]);

        let start = Instant::now();
        let outcome = send_sample(&client, &base_url, file_name, bytes).await;
        let latency = start.elapsed();
        latencies.push(latency);

        match outcome {
            SampleOutcome::Predicted(prediction) => {
                ok_count += 1;
                if let Some(best) = prediction.best() {
                    info!(
                        sample = i + 1,
                        kind = kind,
                        label = %best.label,
                        probability = best.probability,
                        latency_ms = latency.as_millis() as u64,
                        "Prediction"
                    );
                }
            }
            SampleOutcome::Rejected { status, body } => {
                failed_count += 1;
                warn!(sample = i + 1, status = %status, body = %body, "Prediction failed");
            }
            SampleOutcome::Transport(e) => {
                failed_count += 1;
                warn!(sample = i + 1, error = %e, "Request failed");
            }
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    latencies.sort();
    let p50 = latencies.get(latencies.len() / 2).copied().unwrap_or_default();
    let max = latencies.last().copied().unwrap_or_default();
    info!(
        "Completed! Sent {} images ({} ok, {} failed), p50={}ms max={}ms",
        count,
        ok_count,
        failed_count,
        p50.as_millis(),
        max.as_millis()
    );

    Ok(())
}

async fn run_dry_mode(count: u64, noise_rate: f64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (local preprocessing only)");

    let preprocessor = ImagePreprocessor::new();
    let mut generator = ImageGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let image = if rng.gen_bool(noise_rate) {
            generator.generate_noise(256)
        } else {
            generator.generate_fundus(512)
        };

        let bytes = encode(&image, ImageFormat::Png)?;
        let start = Instant::now();
        let tensor = preprocessor.preprocess(&bytes)?;
        let mean = tensor.iter().sum::<f32>() / tensor.len() as f32;

        if (i + 1) % 10 == 0 || i == 0 {
            info!(
                sample = i + 1,
                values = tensor.len(),
                mean = mean,
                preprocess_us = start.elapsed().as_micros() as u64,
                "Preprocessed sample"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_service_is_counted_not_fatal() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let bytes = encode(&ImageGenerator::new().generate_noise(8), ImageFormat::Png).unwrap();

        // nothing listens on port 1
        let outcome = send_sample(
            &client,
            "http://127.0.0.1:1",
            "a.png".to_string(),
            bytes.clone(),
        )
        .await;
        assert!(matches!(outcome, SampleOutcome::Transport(_)));

        // the client stays usable for the next sample
        let outcome =
            send_sample(&client, "http://127.0.0.1:1", "b.png".to_string(), bytes).await;
        assert!(matches!(outcome, SampleOutcome::Transport(_)));
    }
}
