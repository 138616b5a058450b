use crate::cli::ReviewArgs;
use crate::output;
use anyhow::{Context, Result};
use doc_session::{review_prompt, with_document, Config, GeminiService, Review};
use futures::FutureExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn run(config: Config, args: ReviewArgs, interrupt: CancellationToken) -> Result<()> {
    let remote = Arc::new(
        GeminiService::new(config.with_model(&args.doc.model)).with_cancellation(interrupt),
    );
    let prompt = review_prompt(args.query.as_deref());

    log::info!("Reviewing {} with {}", args.doc.input.display(), remote.model());

    let review: Review = with_document(remote, &args.doc.input, move |session| {
        async move { Ok::<_, anyhow::Error>(session.query_as::<Review>(&prompt).await?) }
            .boxed_local()
    })
    .await
    .with_context(|| format!("reviewing {}", args.doc.input.display()))?;

    output::write_json(&review, args.doc.output.as_deref())
}
