use super::{crawl_time, OutputHandler};
use crate::config::ConfigId;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Appends one JSON object per line, so successive runs accumulate.
pub struct JsonLinesOutput {
    file: File,
    config_id: ConfigId,
}

impl JsonLinesOutput {
    pub fn new(path: PathBuf, config_id: ConfigId) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self { file, config_id })
    }
}

#[async_trait]
impl OutputHandler for JsonLinesOutput {
    async fn write(&mut self, item: Value) -> Result<()> {
        let mut item = item;
        if let Value::Object(map) = &mut item {
            map.insert("config_id".to_string(), json!(self.config_id));
            map.insert("crawl_time".to_string(), json!(crawl_time()));
        }
        serde_json::to_writer(&mut self.file, &item)?;
        writeln!(self.file)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_stamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stock_data.jsonl");

        for symbol in ["600519", "000001"] {
            let mut out = JsonLinesOutput::new(path.clone(), ConfigId::new(7)).unwrap();
            out.write(json!({"symbol": symbol})).await.unwrap();
            out.close().await.unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["symbol"], "600519");
        assert_eq!(lines[1]["config_id"], 7);
        assert!(lines[1]["crawl_time"].is_string());
    }
}
