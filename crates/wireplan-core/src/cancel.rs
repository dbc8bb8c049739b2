//! 協作式中止

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::{PlanError, Result};

/// 中止旗標（可跨執行緒共享）
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 要求中止
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// 是否已要求中止
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// 立即檢查
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PlanError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// 迴圈檢查點：每 `interval` 次呼叫讀取一次中止旗標
#[derive(Debug, Clone)]
pub struct Checkpoint {
    token: CancellationToken,
    interval: u32,
    calls: u32,
}

impl Checkpoint {
    pub fn new(token: CancellationToken, interval: u32) -> Self {
        Self {
            token,
            interval: interval.max(1),
            calls: 0,
        }
    }

    /// 迴圈每次迭代呼叫一次
    pub fn tick(&mut self) -> Result<()> {
        self.calls = self.calls.wrapping_add(1);
        if self.calls % self.interval == 0 {
            self.token.check()
        } else {
            Ok(())
        }
    }

    /// 不計次數，立即檢查
    pub fn check(&self) -> Result<()> {
        self.token.check()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// 每位使用者一個中止旗標
#[derive(Debug, Default)]
pub struct CancelRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 為使用者建立新的旗標（取代舊旗標）
    pub fn issue(&self, user_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(user_id.to_string(), token.clone());
        }
        token
    }

    /// 中止使用者的排程；回傳是否有對應旗標
    pub fn cancel(&self, user_id: &str) -> bool {
        match self.tokens.lock() {
            Ok(tokens) => tokens
                .get(user_id)
                .map(|token| {
                    token.cancel();
                    true
                })
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// 移除使用者旗標
    pub fn release(&self, user_id: &str) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.remove(user_id);
        }
    }
}
