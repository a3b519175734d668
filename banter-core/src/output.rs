//! Outbound response pipeline
//!
//! A response line goes through `%VAR{pool}` interpolation, `%|`
//! multipart splitting, the output-plugin rewrite chain, and ACTION
//! framing before it reaches the sink. The sink is the engine's one
//! outward capability; everything else about delivery (queues, rate
//! limits, the wire) belongs to the embedding host.

use std::sync::OnceLock;

use regex::Regex;

use banter_plugin_api::{Host, OutputEvent};

use crate::registry::Registry;

/// Outward delivery channel: one line of text to one destination.
pub trait MessageSink: Send {
    fn send(&mut self, target: &str, text: &str);
}

/// Default sink: standard output.
pub struct ConsoleSink;

impl MessageSink for ConsoleSink {
    fn send(&mut self, target: &str, text: &str) {
        println!("{target}: {text}");
    }
}

/// What goes out when interpolation falls apart.
pub(crate) const FAILURE_LINE: &str = "/has had a tremendous failure working something out";

fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"%VAR\{([^}]+)\}").expect("static pattern"))
}

/// Expand `%VAR{pool}` tokens from the phrase pools, at most ten times.
/// An empty pool or a runaway expansion replaces the whole line with the
/// canonical failure line; the call still counts as interpolated.
pub(crate) fn interpolate(registry: &mut Registry, line: &mut String) -> bool {
    if line.is_empty() {
        return false;
    }
    let mut loops = 0;
    loop {
        let Some((range, pool)) = var_pattern().find(line).map(|found| {
            let token = found.as_str();
            (
                found.range(),
                token["%VAR{".len()..token.len() - 1].to_string(),
            )
        }) else {
            break;
        };
        loops += 1;
        if loops > 10 {
            tracing::warn!(line = %line, "looping too much in %VAR expansion");
            *line = FAILURE_LINE.to_string();
            break;
        }
        match registry.abstract_value(&pool) {
            Some(value) if !value.is_empty() => line.replace_range(range, &value),
            _ => {
                tracing::warn!(pool = %pool, "empty phrase pool in %VAR expansion");
                *line = FAILURE_LINE.to_string();
                break;
            }
        }
    }
    true
}

/// Push one line through the output-plugin chain and out the sink.
///
/// `%STOP` aborts the whole response. Every matching output plugin runs
/// in sequence and may rewrite the line; a failing plugin does not halt
/// the chain. A line reduced to whitespace is dropped. A leading `/`
/// becomes CTCP ACTION framing.
pub(crate) fn say_line(
    registry: &mut Registry,
    channel: &str,
    nick: &str,
    line: &mut String,
    more_text: &str,
) -> bool {
    if line.as_str() == "%STOP" {
        return false;
    }

    let matches = registry.find_output(line);
    tracing::debug!(count = matches.len(), "found output plugins");
    let event = OutputEvent {
        nick: nick.to_string(),
        channel: channel.to_string(),
        more_text: more_text.to_string(),
    };
    for index in matches {
        registry.run_output_plugin(index, &event, line);
    }

    if line.trim().is_empty() {
        return false;
    }

    *line = line.replace("%slash", "/");
    if line.starts_with('/') {
        let action = format!("\u{1}ACTION {}\u{1}", &line[1..]);
        *line = action;
    }

    tracing::debug!(channel = %channel, line = %line, "output");
    registry.send_line(channel, line);
    true
}

/// Emit a response. `None` channel broadcasts to every configured
/// non-silent channel; `%|` splits the text into successive lines.
pub(crate) fn do_action(
    registry: &mut Registry,
    channel: Option<&str>,
    nick: &str,
    text: &str,
    more_text: &str,
    urgent: bool,
) -> bool {
    match channel {
        Some(channel) => {
            if !registry.settings().is_channel_allowed(channel) {
                return false;
            }
            do_action_in(registry, channel, nick, text, more_text, urgent)
        }
        None => {
            let channels = registry.settings().channels().to_vec();
            let mut success = false;
            for channel in channels {
                if registry.settings().is_channel_silent(&channel) {
                    continue;
                }
                if do_action_in(registry, &channel, nick, text, more_text, urgent) {
                    success = true;
                }
            }
            success
        }
    }
}

fn do_action_in(
    registry: &mut Registry,
    channel: &str,
    nick: &str,
    text: &str,
    more_text: &str,
    _urgent: bool,
) -> bool {
    let mut line = text.to_string();
    if !interpolate(registry, &mut line) {
        return false;
    }

    if line.contains("%|") {
        let parts: Vec<String> = line
            .split("%|")
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        if parts.len() > 20 {
            tracing::warn!(line = %line, "bailing out of multipart output, output lost");
            return false;
        }
        for part in &parts {
            let mut part_line = part.clone();
            if !say_line(registry, channel, nick, &mut part_line, more_text) {
                tracing::debug!("say_line stopped, skipping rest of output");
                break;
            }
        }
        return !parts.is_empty();
    }

    say_line(registry, channel, nick, &mut line, more_text)
}
