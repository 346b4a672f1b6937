//! Batch cover generation example - three covers from one topic.
//!
//! Run with: `cargo run --example generate_covers -- "retro synthwave album"`
//!
//! Requires `GOOGLE_API_KEY` environment variable.

use covergen::studio::{BatchOutcome, Studio};
use covergen::{AspectRatio, EnvCredentialGate, GeminiProvider};
use std::sync::Arc;

#[tokio::main]
async fn main() -> covergen::Result<()> {
    let topic = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "neon cityscape podcast cover".to_string());

    let provider = Arc::new(GeminiProvider::builder().build()?);
    let studio = Studio::new(provider, Arc::new(EnvCredentialGate))
        .with_aspect_ratio(AspectRatio::Landscape);
    studio.check_credential().await;
    studio.set_prompt(topic).await;

    match studio.generate_all().await {
        BatchOutcome::Completed(report) => {
            for slot in &report.slots {
                match slot.image() {
                    Some(image) => {
                        let path = format!("cover-{}.{}", slot.id(), image.image().format.extension());
                        image.image().save(&path)?;
                        println!("Saved {path}");
                    }
                    None => println!("Cover {} failed: {:?}", slot.id(), slot.failure_reason()),
                }
            }
        }
        BatchOutcome::Skipped(reason) => println!("Nothing generated: {reason}"),
    }

    Ok(())
}
