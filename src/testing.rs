//! Deterministic encoder used by unit tests in place of a real model.

use anyhow::{anyhow, Result};
use std::sync::Mutex;

use crate::traits::{Device, SentenceEncoder};

const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

/// Character-frequency encoder: one dimension per ASCII letter or digit.
pub struct StubEncoder {
    fail: bool,
    // (texts, batch_size, max_tokens) of every encode call
    calls: Mutex<Vec<(usize, usize, usize)>>,
}

impl StubEncoder {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; ALPHABET.len()];
        for c in text.to_ascii_lowercase().chars() {
            if let Some(pos) = ALPHABET.find(c) {
                vector[pos] += 1.0;
            }
        }
        vector
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<(usize, usize, usize)> {
        self.calls.lock().unwrap().last().copied()
    }
}

impl SentenceEncoder for StubEncoder {
    fn encode(&self, texts: &[String], batch_size: usize, max_tokens: usize) -> Result<Vec<Vec<f32>>> {
        self.calls
            .lock()
            .unwrap()
            .push((texts.len(), batch_size, max_tokens));

        if self.fail {
            return Err(anyhow!("stub failure"));
        }
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        ALPHABET.len()
    }

    fn model_name(&self) -> &str {
        "stub"
    }

    fn device(&self) -> Device {
        Device::Cpu
    }
}
