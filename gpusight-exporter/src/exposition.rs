//! Prometheus text exposition format (version 0.0.4).

use std::fmt::Write;

use gpusight_common::Sample;

/// Content type of the rendered exposition.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples as Prometheus text.
///
/// Samples are grouped into families by metric name, in the order each name
/// is first seen. Every family gets one `# HELP` and one `# TYPE` line.
pub fn render(samples: &[Sample]) -> String {
    let mut families: Vec<(&str, Vec<&Sample>)> = Vec::new();
    for sample in samples {
        let name = sample.desc().fq_name();
        match families.iter_mut().find(|(n, _)| *n == name) {
            Some((_, series)) => series.push(sample),
            None => families.push((name, vec![sample])),
        }
    }

    let mut output = String::with_capacity(samples.len() * 100);

    for (name, series) in families {
        let desc = series[0].desc();

        writeln!(output, "# HELP {} {}", name, escape_help(desc.help())).ok();
        writeln!(output, "# TYPE {} {}", name, desc.metric_type().as_str()).ok();

        for sample in series {
            writeln!(
                output,
                "{}{} {}",
                name,
                format_labels(sample),
                format_value(sample.value())
            )
            .ok();
        }
    }

    output
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape help text. Quotes are left as is.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format a sample's labels, in descriptor order.
fn format_labels(sample: &Sample) -> String {
    let parts: Vec<String> = sample
        .labels()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    if parts.is_empty() {
        return String::new();
    }

    format!("{{{}}}", parts.join(","))
}
