//! Prompt assembly for narration, plus plain-text fallbacks for when the
//! model cannot be reached.

use crate::constants::chat::{NARRATION_FALLBACK, SYSTEM_PROMPT};
use crate::data::store::Conversation;
use crate::dispatch::{BrokerResponseEnvelope, Outcome, Payload};
use crate::error::BrokerError;

use super::ChatTurn;

/// Prior exchanges as alternating user/assistant turns.
pub fn history_turns(history: &[Conversation]) -> Vec<ChatTurn> {
    history
        .iter()
        .flat_map(|c| {
            [
                ChatTurn::user(c.message.clone()),
                ChatTurn::assistant(c.response.clone()),
            ]
        })
        .collect()
}

/// Turns for a message that matched no trading intent.
pub fn chat_turns(message: &str, history: &[ChatTurn], broker: Option<&str>) -> Vec<ChatTurn> {
    let system = match broker {
        Some(broker) => format!(
            "{}\nCurrently using {} broker.",
            SYSTEM_PROMPT,
            broker.to_uppercase()
        ),
        None => SYSTEM_PROMPT.to_string(),
    };
    let mut turns = vec![ChatTurn::system(system)];
    turns.extend_from_slice(history);
    turns.push(ChatTurn::user(message));
    turns
}

/// Turns asking the model to explain a dispatch result, error or not.
pub fn envelope_turns(
    envelope: &BrokerResponseEnvelope,
    message: &str,
    history: &[ChatTurn],
) -> Vec<ChatTurn> {
    let data = serde_json::to_string_pretty(envelope).unwrap_or_else(|_| "{}".to_string());
    let instruction = match &envelope.outcome {
        Outcome::Data { .. } => {
            "Please provide a natural language response explaining this data to the user.\n\
             Focus on the most important details and explain any technical terms."
        }
        Outcome::NeedsMoreInput { .. } => {
            "The request is missing details. Ask the user for exactly the missing fields."
        }
        Outcome::Error { .. } => {
            "The request failed. Explain what went wrong in plain words, name the broker, \
             and say whether retrying later could help."
        }
    };
    let prompt = format!(
        "User Intent: {}\nBroker Used: {}\nUser Message: {}\nAPI Response Data: {}\n\n{}",
        envelope.intent, envelope.broker_used, message, data, instruction
    );

    let mut turns = vec![ChatTurn::system(SYSTEM_PROMPT)];
    turns.extend_from_slice(history);
    turns.push(ChatTurn::user(prompt));
    turns
}

/// Turns for a failure that happened before any broker was chosen.
pub fn error_turns(err: &BrokerError, message: &str) -> Vec<ChatTurn> {
    let report = serde_json::to_string_pretty(&err.report()).unwrap_or_else(|_| "{}".to_string());
    let prompt = format!(
        "User Message: {}\nError: {}\n\nExplain this problem to the user in plain words and \
         tell them what they can do about it.",
        message, report
    );
    vec![ChatTurn::system(SYSTEM_PROMPT), ChatTurn::user(prompt)]
}

/// Plain-text reply used when narration fails.
pub fn fallback_for_envelope(envelope: &BrokerResponseEnvelope) -> String {
    let broker = envelope.broker_used;
    match &envelope.outcome {
        Outcome::Data { payload } => match payload {
            Payload::Account(a) => format!(
                "Your {} account balance is {:.2} {} with {:.2} available, {} open position(s) and unrealized P/L of {:.2}.",
                broker, a.balance, a.currency, a.margin_available, a.open_position_count, a.unrealized_pl
            ),
            Payload::Positions(p) if p.is_empty() => {
                format!("You have no open positions on {}.", broker)
            }
            Payload::Positions(p) => {
                let lines: Vec<String> = p
                    .iter()
                    .map(|pos| format!("{} {:?} {}", pos.instrument, pos.side(), pos.size.abs()))
                    .collect();
                format!("Open positions on {}: {}.", broker, lines.join(", "))
            }
            Payload::Order(o) => format!(
                "Order {} on {} for {} ({}).",
                o.order_id, broker, o.instrument, o.filled_size
            ),
            Payload::Candles(c) => format!(
                "Fetched {} candle(s) for {} from {}.",
                c.len(),
                envelope.instrument.as_deref().unwrap_or("the instrument"),
                broker
            ),
            Payload::Trades(t) => format!("You have {} open order(s) on {}.", t.len(), broker),
        },
        Outcome::NeedsMoreInput { prompt, .. } => prompt.clone(),
        Outcome::Error { error } => error.message.clone(),
    }
}

pub fn fallback_for_error(err: &BrokerError) -> String {
    match err {
        BrokerError::NoBrokerAvailable => err.to_string(),
        _ => format!("{} ({})", err, err.kind()),
    }
}

pub fn fallback_for_chat() -> String {
    NARRATION_FALLBACK.to_string()
}
