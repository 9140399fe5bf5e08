pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS batches (
  id TEXT PRIMARY KEY,
  created_at TEXT NOT NULL,
  finished_at TEXT,
  status TEXT NOT NULL,
  record_count INTEGER NOT NULL,
  input_digest TEXT NOT NULL,
  labels_json TEXT NOT NULL,
  models_json TEXT NOT NULL,
  error TEXT
);

CREATE TABLE IF NOT EXISTS link_results (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  batch_id TEXT NOT NULL REFERENCES batches(id),
  link_index INTEGER NOT NULL,
  record_index INTEGER NOT NULL,
  model TEXT NOT NULL,
  predicted_label TEXT NOT NULL,
  raw_label TEXT NOT NULL,
  confidence REAL NOT NULL,
  label_logprobs_json TEXT NOT NULL,
  error TEXT,
  UNIQUE(batch_id, link_index, record_index)
);

CREATE INDEX IF NOT EXISTS idx_link_results_batch ON link_results(batch_id, link_index);
"#;
