use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use shared_database::{StoreError, SupabaseClient};
use shared_models::{StaffId, StaffMember};

/// Who works at the clinic and in which capacity.
#[async_trait]
pub trait StaffDirectory: Send + Sync {
    async fn get(&self, id: StaffId) -> Result<Option<StaffMember>, StoreError>;

    async fn list(&self) -> Result<Vec<StaffMember>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryStaffDirectory {
    staff: RwLock<HashMap<StaffId, StaffMember>>,
}

impl InMemoryStaffDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, member: StaffMember) {
        self.staff.write().await.insert(member.id, member);
    }

    pub async fn with_staff(members: Vec<StaffMember>) -> Self {
        let directory = Self::new();
        for member in members {
            directory.insert(member).await;
        }
        directory
    }
}

#[async_trait]
impl StaffDirectory for InMemoryStaffDirectory {
    async fn get(&self, id: StaffId) -> Result<Option<StaffMember>, StoreError> {
        Ok(self.staff.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<StaffMember>, StoreError> {
        let mut members: Vec<StaffMember> = self.staff.read().await.values().cloned().collect();
        members.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(members)
    }
}

pub struct SupabaseStaffDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseStaffDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<StaffMember>, StoreError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<StaffMember>, _>>()
            .map_err(|e| StoreError::Malformed(format!("Failed to parse staff: {}", e)))
    }
}

#[async_trait]
impl StaffDirectory for SupabaseStaffDirectory {
    async fn get(&self, id: StaffId) -> Result<Option<StaffMember>, StoreError> {
        debug!("Fetching staff member: {}", id);

        let path = format!("/rest/v1/staff?id=eq.{}&select=id,display_name,role", id);
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(Self::parse_rows(result)?.into_iter().next())
    }

    async fn list(&self) -> Result<Vec<StaffMember>, StoreError> {
        let path = "/rest/v1/staff?select=id,display_name,role&order=display_name.asc";
        let result: Vec<Value> = self.supabase.request(Method::GET, path, None, None).await?;
        Self::parse_rows(result)
    }
}
