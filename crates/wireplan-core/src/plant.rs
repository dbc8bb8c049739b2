//! 工廠參考資料（靜態、唯讀）

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::{
    BillOfMaterials, BomId, Item, Machine, PlanError, ProcessStage, Result, RoutingTable,
    SetupTimeTable, Stock,
};

/// 工廠參考資料
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlantData {
    /// 工廠代碼
    pub plant_id: String,

    /// 物料（依名稱索引）
    items: HashMap<String, Item>,

    /// 機台（保留輸入順序）
    machines: Vec<Machine>,

    /// 途程表
    routings: RoutingTable,

    /// 物料清單
    boms: Vec<BillOfMaterials>,

    /// 庫存
    stock: Vec<Stock>,

    /// 換線時間表
    setup_times: SetupTimeTable,
}

impl PlantData {
    /// 創建空的工廠資料
    pub fn new(plant_id: impl Into<String>) -> Self {
        Self {
            plant_id: plant_id.into(),
            ..Self::default()
        }
    }

    /// 建構器模式：設置物料
    pub fn with_items(mut self, items: Vec<Item>) -> Self {
        self.items = items.into_iter().map(|i| (i.name.clone(), i)).collect();
        self
    }

    /// 建構器模式：設置機台
    pub fn with_machines(mut self, machines: Vec<Machine>) -> Self {
        self.machines = machines;
        self
    }

    /// 建構器模式：設置途程
    pub fn with_routings(mut self, routings: RoutingTable) -> Self {
        self.routings = routings;
        self
    }

    /// 建構器模式：設置 BOM
    pub fn with_boms(mut self, boms: Vec<BillOfMaterials>) -> Self {
        self.boms = boms;
        self
    }

    /// 建構器模式：設置庫存
    pub fn with_stock(mut self, stock: Vec<Stock>) -> Self {
        self.stock = stock;
        self
    }

    /// 建構器模式：設置換線時間
    pub fn with_setup_times(mut self, setup_times: SetupTimeTable) -> Self {
        self.setup_times = setup_times;
        self
    }

    /// 查詢物料
    pub fn item(&self, name: &str) -> Option<&Item> {
        self.items.get(name)
    }

    /// 查詢物料（不存在時回傳錯誤）
    pub fn require_item(&self, name: &str) -> Result<&Item> {
        self.item(name)
            .ok_or_else(|| PlanError::ItemNotFound(name.to_string()))
    }

    /// 物料項數
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// 物料材質
    pub fn material_of(&self, name: &str) -> Option<&str> {
        self.item(name).map(|i| i.material_type.as_str())
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    /// 查詢機台
    pub fn machine(&self, code: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.code == code)
    }

    /// 指定階段的機台（依輸入順序）
    pub fn machines_of(&self, stage: ProcessStage) -> impl Iterator<Item = &Machine> {
        self.machines.iter().filter(move |m| m.stage == stage)
    }

    pub fn routings(&self) -> &RoutingTable {
        &self.routings
    }

    pub fn boms(&self) -> &[BillOfMaterials] {
        &self.boms
    }

    /// 根物料的所有 BOM 版本
    pub fn boms_of<'a>(&'a self, root: &'a str) -> impl Iterator<Item = &'a BillOfMaterials> + 'a {
        self.boms.iter().filter(move |b| b.root == root)
    }

    /// 查詢 BOM
    pub fn bom(&self, id: BomId) -> Option<&BillOfMaterials> {
        self.boms.iter().find(|b| b.id == id)
    }

    /// 物料是否為 BOM 根
    pub fn is_bom_root(&self, name: &str) -> bool {
        self.boms.iter().any(|b| b.root == name)
    }

    /// 擁有多個版本的根物料及其子件組合（供停用組合選擇）
    pub fn alternate_boms(&self) -> BTreeMap<String, Vec<Vec<String>>> {
        let mut grouped: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
        for bom in &self.boms {
            grouped.entry(bom.root.clone()).or_default().push(bom.signature());
        }
        grouped.retain(|_, combos| combos.len() > 1);
        grouped
    }

    pub fn stock(&self) -> &[Stock] {
        &self.stock
    }

    pub fn setup_times(&self) -> &SetupTimeTable {
        &self.setup_times
    }
}
