//! JSONL row IO for `stance run`.
//!
//! Input rows keep every field they arrive with; the annotation columns are
//! added on output.

use anyhow::Context;
use serde_json::{Map, Value};
use stance_core::model::{AnnotatedRow, Record};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const TEXT_FIELDS: [&str; 2] = ["text", "Tweet"];
const TARGET_FIELDS: [&str; 2] = ["target", "Target"];

#[derive(Debug)]
pub struct InputRow {
    pub record: Record,
    pub fields: Map<String, Value>,
}

pub fn read_rows(path: &Path) -> anyhow::Result<Vec<InputRow>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open input {}", path.display()))?;
    let mut out = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(parse_row(&line).with_context(|| format!("line {}", n + 1))?);
    }
    Ok(out)
}

fn parse_row(line: &str) -> anyhow::Result<InputRow> {
    let value: Value = serde_json::from_str(line).context("invalid JSON")?;
    let Value::Object(fields) = value else {
        anyhow::bail!("expected a JSON object");
    };
    let text = string_field(&fields, &TEXT_FIELDS)?;
    let target = string_field(&fields, &TARGET_FIELDS)?;
    Ok(InputRow {
        record: Record::new(text, target),
        fields,
    })
}

fn string_field(fields: &Map<String, Value>, names: &[&str]) -> anyhow::Result<String> {
    names
        .iter()
        .find_map(|n| fields.get(*n))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("missing string field '{}'", names[0]))
}

/// Merge annotation columns into the original row.
pub fn annotate(input: &InputRow, row: &AnnotatedRow) -> anyhow::Result<Value> {
    let mut fields = input.fields.clone();
    fields.insert("pred_label".into(), Value::String(row.pred_label.clone()));
    fields.insert("conf_score".into(), serde_json::to_value(row.conf_score)?);
    fields.insert(
        "label_logprobs".into(),
        serde_json::to_value(&row.label_logprobs)?,
    );
    fields.insert(
        "raw_pred_label".into(),
        Value::String(row.raw_pred_label.clone()),
    );
    fields.insert("resolved_at".into(), Value::from(row.resolved_at));
    Ok(Value::Object(fields))
}

pub fn write_jsonl<I>(path: Option<&Path>, values: I) -> anyhow::Result<usize>
where
    I: IntoIterator<Item = Value>,
{
    let sink: Box<dyn Write> = match path {
        Some(p) => {
            if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Box::new(
                std::fs::File::create(p)
                    .with_context(|| format!("failed to create {}", p.display()))?,
            )
        }
        None => Box::new(std::io::stdout().lock()),
    };
    let mut w = BufWriter::new(sink);
    let mut n = 0;
    for v in values {
        serde_json::to_writer(&mut w, &v)?;
        w.write_all(b"\n")?;
        n += 1;
    }
    w.flush()?;
    Ok(n)
}
