//! MongoDB document store backend
//!
//! JSON documents are converted with extended-JSON semantics, so
//! `{"$date": ...}` and `{"$oid": ...}` in migration files arrive as BSON
//! dates and object ids.

use crate::error::{DbError, DbResult};
use crate::traits::{Document, DocumentStore};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document as BsonDocument};
use mongodb::options::{CreateCollectionOptions, FindOptions, IndexOptions, UpdateOptions};
use mongodb::{Client, Database as MongoDatabase, IndexModel};
use serde_json::Value;

/// MongoDB backend bound to one database
pub struct MongoBackend {
    client: Client,
    db: MongoDatabase,
}

impl MongoBackend {
    /// Connect to `url` and select `database`.
    ///
    /// The driver connects lazily; call [`DocumentStore::ping`] to verify
    /// the server is reachable.
    pub async fn connect(url: &str, database: &str) -> DbResult<Self> {
        let client = Client::with_uri_str(url)
            .await
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        let db = client.database(database);
        Ok(Self { client, db })
    }

    fn collection(&self, name: &str) -> mongodb::Collection<BsonDocument> {
        self.db.collection::<BsonDocument>(name)
    }
}

/// JSON object to BSON document.
pub(crate) fn to_bson(document: &Document) -> DbResult<BsonDocument> {
    match Bson::try_from(Value::Object(document.clone())) {
        Ok(Bson::Document(d)) => Ok(d),
        Ok(other) => Err(DbError::InvalidDocument(format!(
            "expected an object, got {:?}",
            other.element_type()
        ))),
        Err(e) => Err(DbError::InvalidDocument(e.to_string())),
    }
}

/// BSON document to JSON object (relaxed extended JSON).
pub(crate) fn from_bson(document: BsonDocument) -> DbResult<Document> {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(map) => Ok(map),
        other => Err(DbError::InvalidDocument(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Deserialize a driver options struct from a JSON object.
fn options_from<T: serde::de::DeserializeOwned>(options: &Document) -> DbResult<Option<T>> {
    if options.is_empty() {
        return Ok(None);
    }
    let document = to_bson(options)?;
    bson::from_document(document)
        .map(Some)
        .map_err(|e| DbError::InvalidDocument(format!("invalid options: {}", e)))
}

#[async_trait]
impl DocumentStore for MongoBackend {
    async fn ping(&self) -> DbResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(())
    }

    async fn list_collections(&self) -> DbResult<Vec<String>> {
        let mut names = self.db.list_collection_names(None).await?;
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str, options: &Document) -> DbResult<()> {
        let options: Option<CreateCollectionOptions> = options_from(options)?;
        self.db.create_collection(name, options).await?;
        Ok(())
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: &Document,
        options: &Document,
    ) -> DbResult<String> {
        let options: Option<IndexOptions> = options_from(options)?;
        let model = IndexModel::builder()
            .keys(to_bson(keys)?)
            .options(options)
            .build();
        let result = self.collection(collection).create_index(model, None).await?;
        Ok(result.index_name)
    }

    async fn insert_one(&self, collection: &str, document: &Document) -> DbResult<()> {
        self.collection(collection)
            .insert_one(to_bson(document)?, None)
            .await?;
        Ok(())
    }

    async fn insert_many(&self, collection: &str, documents: &[Document]) -> DbResult<u64> {
        if documents.is_empty() {
            return Ok(0);
        }
        let docs = documents.iter().map(to_bson).collect::<DbResult<Vec<_>>>()?;
        let result = self.collection(collection).insert_many(docs, None).await?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        update: &Value,
        options: &Document,
    ) -> DbResult<u64> {
        let options: Option<UpdateOptions> = options_from(options)?;
        let filter = to_bson(filter)?;
        let coll = self.collection(collection);
        let result = match update {
            Value::Object(map) => coll.update_many(filter, to_bson(map)?, options).await?,
            Value::Array(stages) => {
                let pipeline = stages
                    .iter()
                    .map(|stage| match stage {
                        Value::Object(map) => to_bson(map),
                        other => Err(DbError::InvalidDocument(format!(
                            "update pipeline stage must be an object, got {}",
                            other
                        ))),
                    })
                    .collect::<DbResult<Vec<_>>>()?;
                coll.update_many(filter, pipeline, options).await?
            }
            other => {
                return Err(DbError::InvalidDocument(format!(
                    "update must be an object or a pipeline, got {}",
                    other
                )))
            }
        };
        Ok(result.modified_count)
    }

    async fn delete_many(&self, collection: &str, filter: &Document) -> DbResult<u64> {
        let result = self
            .collection(collection)
            .delete_many(to_bson(filter)?, None)
            .await?;
        Ok(result.deleted_count)
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Document]) -> DbResult<u64> {
        let stages = pipeline.iter().map(to_bson).collect::<DbResult<Vec<_>>>()?;
        let mut cursor = self.collection(collection).aggregate(stages, None).await?;
        let mut count = 0u64;
        while cursor.try_next().await?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    async fn find_sorted(
        &self,
        collection: &str,
        filter: &Document,
        sort: &Document,
        limit: Option<i64>,
    ) -> DbResult<Vec<Document>> {
        let options = FindOptions::builder()
            .sort(to_bson(sort)?)
            .limit(limit)
            .build();
        let cursor = self
            .collection(collection)
            .find(to_bson(filter)?, options)
            .await?;
        let docs: Vec<BsonDocument> = cursor.try_collect().await?;
        docs.into_iter().map(from_bson).collect()
    }

    async fn drop_collection(&self, name: &str) -> DbResult<()> {
        self.collection(name).drop(None).await?;
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "mongodb"
    }
}
