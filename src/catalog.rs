//! 工廠參考資料快取
//!
//! 每個工廠的參考資料只讀取一次，以 `Arc` 在各次排程間唯讀共享。
//! 機台停用不修改共享資料，而是記在各次排程的 `Criteria` 中。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use wireplan_core::{PlanError, PlantData, PlantRepository, Result};

/// 工廠參考資料目錄
pub struct PlantCatalog {
    repository: Arc<dyn PlantRepository>,
    plants: RwLock<HashMap<String, Arc<PlantData>>>,
}

impl PlantCatalog {
    pub fn new(repository: Arc<dyn PlantRepository>) -> Self {
        Self {
            repository,
            plants: RwLock::new(HashMap::new()),
        }
    }

    /// 取得工廠資料，首次讀取時向資料來源載入
    pub fn get(&self, plant_id: &str) -> Result<Arc<PlantData>> {
        if let Some(plant) = self.read()?.get(plant_id) {
            return Ok(Arc::clone(plant));
        }

        let loaded = Arc::new(self.repository.load_plant(plant_id)?);
        tracing::info!(
            "載入工廠 {}：物料 {} 項、機台 {} 台",
            plant_id,
            loaded.item_count(),
            loaded.machines().len()
        );

        let mut plants = self
            .plants
            .write()
            .map_err(|_| PlanError::DataAccess(anyhow::anyhow!("工廠目錄鎖已損壞")))?;
        Ok(Arc::clone(plants.entry(plant_id.to_string()).or_insert(loaded)))
    }

    /// 移除快取，下次取得時重新載入；回傳是否有快取
    pub fn invalidate(&self, plant_id: &str) -> bool {
        self.plants
            .write()
            .map(|mut plants| plants.remove(plant_id).is_some())
            .unwrap_or(false)
    }

    /// 已快取的工廠數
    pub fn len(&self) -> usize {
        self.read().map(|plants| plants.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Arc<PlantData>>>> {
        self.plants
            .read()
            .map_err(|_| PlanError::DataAccess(anyhow::anyhow!("工廠目錄鎖已損壞")))
    }
}
