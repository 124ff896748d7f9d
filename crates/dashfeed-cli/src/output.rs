use std::io::{self, Write};

use dashfeed_core::Envelope;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::error::CliError;

pub fn render(envelope: &Envelope<Value>, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(envelope)?
            } else {
                serde_json::to_string(envelope)?
            };
            writeln!(out, "{payload}")?;
        }
        OutputFormat::Table => write_table(&mut out, envelope)?,
    }
    Ok(())
}

fn write_table(out: &mut impl Write, envelope: &Envelope<Value>) -> Result<(), CliError> {
    writeln!(out, "request_id  : {}", envelope.meta.request_id)?;
    writeln!(out, "generated_at: {}", envelope.meta.generated_at)?;
    writeln!(out, "network     : {}", envelope.meta.network)?;
    writeln!(out, "sources     : {}", envelope.meta.source_chain.join(","))?;
    writeln!(out, "latency_ms  : {}", envelope.meta.latency_ms)?;

    if !envelope.meta.warnings.is_empty() {
        writeln!(out, "warnings:")?;
        for warning in &envelope.meta.warnings {
            writeln!(out, "  - {warning}")?;
        }
    }

    writeln!(out, "data:")?;
    match rows(&envelope.data) {
        Some(rows) => write_rows(out, &rows)?,
        None => {
            let pretty_data = serde_json::to_string_pretty(&envelope.data)?;
            for line in pretty_data.lines() {
                writeln!(out, "  {line}")?;
            }
        }
    }

    if !envelope.errors.is_empty() {
        writeln!(out, "errors:")?;
        for error in &envelope.errors {
            match &error.source {
                Some(source) => writeln!(out, "  - [{source}] {}: {}", error.code, error.message)?,
                None => writeln!(out, "  - {}: {}", error.code, error.message)?,
            }
        }
    }

    Ok(())
}

/// Two-column rows for a `rates` array or a flat object.
fn rows(data: &Value) -> Option<Vec<(String, String)>> {
    if let Some(rates) = data.get("rates").and_then(Value::as_array) {
        return rates
            .iter()
            .map(|rate| {
                Some((
                    rate.get("currency_code")?.as_str()?.to_owned(),
                    scalar(rate.get("rate")?)?,
                ))
            })
            .collect();
    }

    data.as_object()?
        .iter()
        .map(|(key, value)| Some((key.clone(), scalar(value)?)))
        .collect()
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null => Some(String::from("-")),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn write_rows(out: &mut impl Write, rows: &[(String, String)]) -> io::Result<()> {
    let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    for (key, value) in rows {
        writeln!(out, "  {key:<width$}  {value}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashfeed_core::EnvelopeMeta;
    use serde_json::json;

    fn table(data: Value) -> String {
        let meta = EnvelopeMeta::new("request-12345", "mainnet", vec![String::from("dashretail")], 3)
            .expect("meta");
        let mut out = Vec::new();
        write_table(&mut out, &Envelope::success(meta, data)).expect("renders");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn rates_render_as_aligned_rows() {
        let rendered = table(json!({
            "rates": [
                {"currency_code": "EUR", "rate": "61.2"},
                {"currency_code": "USDT", "rate": "70"}
            ]
        }));

        assert!(rendered.contains("  EUR   61.2\n"));
        assert!(rendered.contains("  USDT  70\n"));
    }

    #[test]
    fn nested_data_falls_back_to_json() {
        let rendered = table(json!({"utxos": [{"value": 1}]}));
        assert!(rendered.contains("\"utxos\""));
    }
}
