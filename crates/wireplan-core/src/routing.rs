//! 途程模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 途程：(物料, 機台) → 週期時間與權重
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routing {
    /// 物料名稱
    pub item: String,

    /// 機台代碼
    pub machine: String,

    /// 週期時間（每單位分鐘）
    pub cycle_time: Decimal,

    /// 權重/優先級
    pub weight: u32,
}

impl Routing {
    /// 創建新的途程
    pub fn new(item: impl Into<String>, machine: impl Into<String>, cycle_time: Decimal) -> Self {
        Self {
            item: item.into(),
            machine: machine.into(),
            cycle_time,
            weight: 1,
        }
    }

    /// 建構器模式：設置權重
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// 途程表（保留輸入順序，並以 (機台, 物料) 建立索引）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Routing>", into = "Vec<Routing>")]
pub struct RoutingTable {
    routings: Vec<Routing>,
    index: HashMap<(String, String), usize>,
}

impl RoutingTable {
    /// 從途程清單建立
    pub fn new(routings: Vec<Routing>) -> Self {
        let mut table = Self::default();
        for routing in routings {
            table.insert(routing);
        }
        table
    }

    /// 新增途程（同一 (機台, 物料) 以後者為準）
    pub fn insert(&mut self, routing: Routing) {
        let key = (routing.machine.clone(), routing.item.clone());
        match self.index.get(&key) {
            Some(&idx) => self.routings[idx] = routing,
            None => {
                self.index.insert(key, self.routings.len());
                self.routings.push(routing);
            }
        }
    }

    /// 查詢途程
    pub fn get(&self, machine: &str, item: &str) -> Option<&Routing> {
        self.index
            .get(&(machine.to_string(), item.to_string()))
            .map(|&idx| &self.routings[idx])
    }

    /// 週期時間
    pub fn cycle_time(&self, machine: &str, item: &str) -> Option<Decimal> {
        self.get(machine, item).map(|r| r.cycle_time)
    }

    /// 途程權重
    pub fn weight(&self, machine: &str, item: &str) -> Option<u32> {
        self.get(machine, item).map(|r| r.weight)
    }

    /// 物料的所有途程（依輸入順序）
    pub fn for_item<'a>(&'a self, item: &'a str) -> impl Iterator<Item = &'a Routing> + 'a {
        self.routings.iter().filter(move |r| r.item == item)
    }

    pub fn len(&self) -> usize {
        self.routings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routings.is_empty()
    }
}

impl From<Vec<Routing>> for RoutingTable {
    fn from(routings: Vec<Routing>) -> Self {
        Self::new(routings)
    }
}

impl From<RoutingTable> for Vec<Routing> {
    fn from(table: RoutingTable) -> Self {
        table.routings
    }
}
