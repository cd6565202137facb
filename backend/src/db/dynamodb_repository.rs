use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use serde_json;
use std::collections::HashMap;
use uuid::Uuid;

use super::DiagnosisTable;
use crate::diagnosis::models::DiagnosisRecord;

#[derive(Clone)]
pub struct DynamoDbRepository {
    client: Client,
    diagnoses_table: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

impl DynamoDbRepository {
    pub fn new(client: Client, diagnoses_table: String) -> Self {
        Self {
            client,
            diagnoses_table,
        }
    }
}

#[async_trait]
impl DiagnosisTable for DynamoDbRepository {
    async fn create_diagnosis(&self, record: &DiagnosisRecord) -> Result<(), RepositoryError> {
        let item = diagnosis_to_item(record)?;

        match self
            .client
            .put_item()
            .table_name(&self.diagnoses_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
        {
            Ok(_) => {
                log::info!("Stored diagnosis {} for user {}", record.id, record.owner);
                Ok(())
            }
            Err(e) => {
                log::error!("DynamoDB put_item failed for diagnosis {}: {:?}", record.id, e);
                Err(RepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn get_diagnosis(&self, id: Uuid) -> Result<Option<DiagnosisRecord>, RepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.diagnoses_table)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        match result.item {
            Some(item) => Ok(Some(parse_diagnosis_from_item(&item)?)),
            None => Ok(None),
        }
    }

    async fn get_user_diagnoses(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<DiagnosisRecord>, RepositoryError> {
        let mut records = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let result = self
                .client
                .scan()
                .table_name(&self.diagnoses_table)
                .filter_expression("user_id = :user_id")
                .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

            if let Some(items) = result.items {
                for item in items {
                    records.push(parse_diagnosis_from_item(&item)?);
                }
            }

            match result.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        log::debug!("Found {} diagnoses for user {}", records.len(), user_id);
        Ok(records)
    }

    async fn delete_diagnosis(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.client
            .delete_item()
            .table_name(&self.diagnoses_table)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

        Ok(())
    }
}

fn diagnosis_to_item(
    record: &DiagnosisRecord,
) -> Result<HashMap<String, AttributeValue>, RepositoryError> {
    let mut item = HashMap::new();
    item.insert("id".to_string(), AttributeValue::S(record.id.to_string()));
    item.insert(
        "user_id".to_string(),
        AttributeValue::S(record.owner.to_string()),
    );
    item.insert(
        "image_key".to_string(),
        AttributeValue::S(record.image_key.clone()),
    );
    item.insert(
        "image_hash".to_string(),
        AttributeValue::S(record.image_hash.clone()),
    );
    item.insert(
        "mime_type".to_string(),
        AttributeValue::S(record.mime_type.clone()),
    );
    item.insert(
        "result".to_string(),
        AttributeValue::S(serde_json::to_string(&record.result)?),
    );
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(record.created_at.to_rfc3339()),
    );
    Ok(item)
}

fn get_string(item: &HashMap<String, AttributeValue>, key: &str) -> Result<String, RepositoryError> {
    item.get(key)
        .and_then(|av| av.as_s().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| RepositoryError::InvalidData(format!("Missing {} attribute", key)))
}

fn get_uuid(item: &HashMap<String, AttributeValue>, key: &str) -> Result<Uuid, RepositoryError> {
    let value = get_string(item, key)?;
    Uuid::parse_str(&value)
        .map_err(|_| RepositoryError::InvalidData(format!("Invalid UUID in {}: {}", key, value)))
}

fn parse_diagnosis_from_item(
    item: &HashMap<String, AttributeValue>,
) -> Result<DiagnosisRecord, RepositoryError> {
    let created_at = get_string(item, "created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| RepositoryError::InvalidData(format!("Invalid created_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(DiagnosisRecord {
        id: get_uuid(item, "id")?,
        owner: get_uuid(item, "user_id")?,
        image_key: get_string(item, "image_key")?,
        image_hash: get_string(item, "image_hash")?,
        mime_type: get_string(item, "mime_type")?,
        result: serde_json::from_str(&get_string(item, "result")?)?,
        created_at,
    })
}
