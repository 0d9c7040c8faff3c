use chrono::{DateTime, Utc};

use crate::evaluate::Evaluation;
use crate::model::{Alert, NewQueueEntry};

/// Build one pending queue entry per delivery channel configured on the
/// alert. An alert with no channels fires silently into history; the empty
/// vec is not an error.
pub fn build_entries(
    alert: &Alert,
    evaluation: &Evaluation,
    now: DateTime<Utc>,
    max_retries: i64,
) -> Vec<NewQueueEntry> {
    let subject = render_subject(alert);
    let body = render_body(alert, evaluation);

    alert
        .channels
        .iter()
        .map(|channel| NewQueueEntry {
            user_id: alert.user_id,
            alert_id: alert.id,
            method: channel.method,
            recipient: channel.target.clone(),
            priority: alert.priority,
            subject: subject.clone(),
            body: body.clone(),
            scheduled_at: now,
            max_retries,
        })
        .collect()
}

fn render_subject(alert: &Alert) -> String {
    format!("Alert: {} ({})", alert.name, alert.symbol)
}

fn render_body(alert: &Alert, evaluation: &Evaluation) -> String {
    let change = evaluate_change(alert, evaluation);
    format!(
        "{} triggered on {} — {} at {:.4}{}",
        alert.name,
        alert.symbol,
        alert.trigger.label(),
        evaluation.trigger_value,
        change,
    )
}

fn evaluate_change(alert: &Alert, evaluation: &Evaluation) -> String {
    let price = evaluation
        .detail
        .get("price")
        .and_then(|v| v.as_f64())
        .unwrap_or(evaluation.trigger_value);
    if alert.baseline_price > 0.0 {
        let pct = crate::evaluate::percent_change(alert.baseline_price, price);
        format!(" ({pct:+.2}% from baseline {:.2})", alert.baseline_price)
    } else {
        String::new()
    }
}
