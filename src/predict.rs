//! Authorship prediction between two stored accounts.

use serde::Serialize;

use crate::classifier::LogisticRegression;
use crate::context::AppContext;
use crate::embedding::embed_one;
use crate::error::{MastodoffError, Result};
use crate::lookup::get_db_account;
use crate::models::Account;
use crate::store;

/// Outcome of [`predict_account`].
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// The account judged more likely to have written the text.
    pub account: Account,
    /// The other account.
    pub other: Account,
    /// Model probability that `account` wrote the text, in `[0.5, 1]`.
    pub probability: f64,
    /// Training statuses used for `account` and `other`.
    pub samples: (usize, usize),
}

/// Which of `username1` and `username2` more likely wrote `content`?
///
/// Account 1's stored embeddings are labelled positive and account 2's
/// negative; a fresh logistic regression is fitted and applied to the
/// embedding of `content`.
pub async fn predict_account(
    ctx: &AppContext,
    username1: &str,
    username2: &str,
    content: &str,
) -> Result<Prediction> {
    let content = content.trim();
    if content.is_empty() {
        return Err(MastodoffError::InvalidInput(
            "text to classify must not be empty".to_string(),
        ));
    }

    let account1 = get_db_account(ctx, username1).await?;
    let account2 = get_db_account(ctx, username2).await?;
    if account1.id == account2.id {
        return Err(MastodoffError::InvalidInput(format!(
            "{} and {} are the same account",
            username1, username2
        )));
    }

    let positives = store::embeddings_for(&ctx.pool, &account1.id).await?;
    let negatives = store::embeddings_for(&ctx.pool, &account2.id).await?;
    let samples = (positives.len(), negatives.len());
    tracing::info!(
        "Training on {} statuses from {} and {} from {}...",
        samples.0,
        account1.acct,
        samples.1,
        account2.acct
    );

    let mut labels = vec![true; positives.len()];
    labels.resize(positives.len() + negatives.len(), false);
    let mut vectors = positives;
    vectors.extend(negatives);

    let config = ctx.config.classifier.clone();
    let model = tokio::task::spawn_blocking(move || {
        LogisticRegression::fit(&vectors, &labels, &config)
    })
    .await
    .map_err(|e| MastodoffError::Classifier(format!("training task failed: {}", e)))??;

    let query = embed_one(ctx.embedder.as_ref(), content).await?;
    let p1 = model.predict_proba(&query)?;
    tracing::info!(probability = p1, "Predicted authorship");

    let prediction = if p1 >= 0.5 {
        Prediction {
            account: account1,
            other: account2,
            probability: p1,
            samples,
        }
    } else {
        Prediction {
            account: account2,
            other: account1,
            probability: 1.0 - p1,
            samples: (samples.1, samples.0),
        }
    };
    Ok(prediction)
}
