//! Judges one monitoring window with the LLM-graded correctness metric.
//!
//! Needs OPENAI_API_KEY and OPENAI_API_BASE in the environment.
//!
//! Run with: cargo run --example judge_window

use std::sync::Arc;

use evalloop::judge::now_infer_time;
use evalloop::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().compact().init();

    let credentials = Credentials::from_secrets(&EnvSecrets)?;
    let client = LlmClient::new(&ModelConfig::named("gpt-4o"), credentials);
    let metric = GEvalMetric::correctness(Arc::new(client));

    let app = JudgeApplication::new("deepeval-correctness", Judge::new(Arc::new(metric)));

    let sample = vec![
        SampleRow::new("How do I open a savings account?", "Visit a branch with a photo ID."),
        SampleRow::new("What is the overdraft fee?", "The overdraft fee is $35 per item."),
        SampleRow::new("Can I transfer money abroad?", "Preheat the oven to 180 degrees."),
    ];

    let store = Arc::new(MonitorStore::in_memory()?);
    let mut ctx = StoreContext::new(store.clone(), sample, now_infer_time());
    let record = ctx.track(&app).await?;

    println!(
        "{}: mean={:.3} status={}",
        record.result.name, record.result.value, record.result.status
    );
    for artifact in store.list_datasets(None)? {
        println!("artifact {}/{} ({} rows)", artifact.key, artifact.tag, artifact.row_count);
    }

    Ok(())
}
