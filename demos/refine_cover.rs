//! Cover refinement example - generates a batch, then refines the first cover.
//!
//! Run with: `cargo run --example refine_cover -- "vintage jazz poster" "add falling snow"`
//!
//! Requires `GOOGLE_API_KEY` environment variable.

use covergen::studio::{BatchOutcome, RefineOutcome, Studio};
use covergen::{EnvCredentialGate, GeminiProvider};
use std::sync::Arc;

#[tokio::main]
async fn main() -> covergen::Result<()> {
    let mut args = std::env::args().skip(1);
    let topic = args.next().unwrap_or_else(|| "vintage jazz poster".to_string());
    let instruction = args.next().unwrap_or_else(|| "add falling snow".to_string());

    let provider = Arc::new(GeminiProvider::builder().build()?);
    let studio = Studio::new(provider, Arc::new(EnvCredentialGate));
    studio.check_credential().await;
    studio.set_prompt(topic).await;

    let BatchOutcome::Completed(report) = studio.generate_all().await else {
        println!("Nothing generated");
        return Ok(());
    };
    let Some(slot) = report.slots.iter().find(|slot| slot.is_ready()) else {
        println!("Every cover failed");
        return Ok(());
    };

    let mut card = studio.card(slot.id());
    card.open_editor(slot);
    card.set_draft(instruction);

    match studio.refine(&mut card).await {
        RefineOutcome::Applied(refined) => {
            if let Some(image) = refined.image() {
                let path = format!("refined.{}", image.image().format.extension());
                image.image().save(&path)?;
                println!("Saved {path}");
            }
            println!("Refined: {}", refined.source_prompt());
        }
        RefineOutcome::Failed { message, .. } => println!("{message}"),
        other => println!("Refinement not applied: {other:?}"),
    }

    Ok(())
}
