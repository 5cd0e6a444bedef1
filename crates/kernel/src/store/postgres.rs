//! PostgreSQL implementation of LayoutStore.
//!
//! Executes SQL directly against the layout tables. Multi-row writes run in a
//! single transaction so a failure never leaves a partial batch behind.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::{DefinitionQuery, DefinitionQueryBuilder, LayoutStore};
use crate::models::{
    BlockNode, BlockStatus, ComponentDefinition, ComponentInstance, ContentSnapshot,
    LayoutRevision,
};

const INSERT_NODE_SQL: &str = r#"
    INSERT INTO block_node (id, page_id, block_type, content, metadata, position, status,
                            parent_block_id, slot, depth, instance_id, created, changed)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
"#;

/// PostgreSQL-backed layout store.
#[derive(Clone)]
pub struct PgLayoutStore {
    pool: PgPool,
}

impl PgLayoutStore {
    /// Create a new store with a database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn insert_node<'e, E>(executor: E, node: &BlockNode) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(INSERT_NODE_SQL)
        .bind(node.id)
        .bind(node.page_id)
        .bind(&node.block_type)
        .bind(&node.content)
        .bind(&node.metadata)
        .bind(node.position)
        .bind(node.status)
        .bind(node.parent_block_id)
        .bind(&node.slot)
        .bind(node.depth)
        .bind(node.instance_id)
        .bind(node.created)
        .bind(node.changed)
        .execute(executor)
        .await
        .with_context(|| format!("failed to insert block node {}", node.id))?;
    Ok(())
}

#[async_trait]
impl LayoutStore for PgLayoutStore {
    async fn get_node(&self, id: Uuid) -> Result<Option<BlockNode>> {
        let node = sqlx::query_as::<_, BlockNode>("SELECT * FROM block_node WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch block node by id")?;

        Ok(node)
    }

    async fn get_nodes(&self, ids: &[Uuid]) -> Result<Vec<BlockNode>> {
        let nodes = sqlx::query_as::<_, BlockNode>(
            "SELECT * FROM block_node WHERE id = ANY($1) ORDER BY position ASC, id ASC",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch block nodes by id")?;

        Ok(nodes)
    }

    async fn list_page_nodes(
        &self,
        page_id: Uuid,
        status: Option<BlockStatus>,
    ) -> Result<Vec<BlockNode>> {
        let nodes = sqlx::query_as::<_, BlockNode>(
            r#"
            SELECT * FROM block_node
            WHERE page_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY position ASC, id ASC
            "#,
        )
        .bind(page_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .context("failed to list page block nodes")?;

        Ok(nodes)
    }

    async fn list_children(&self, parent_ids: &[Uuid]) -> Result<Vec<BlockNode>> {
        let nodes = sqlx::query_as::<_, BlockNode>(
            r#"
            SELECT * FROM block_node
            WHERE parent_block_id = ANY($1)
            ORDER BY position ASC, id ASC
            "#,
        )
        .bind(parent_ids)
        .fetch_all(&self.pool)
        .await
        .context("failed to list child block nodes")?;

        Ok(nodes)
    }

    async fn insert_nodes(&self, nodes: &[BlockNode]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to start transaction")?;

        for node in nodes {
            insert_node(&mut *tx, node).await?;
        }

        tx.commit().await.context("failed to commit transaction")?;
        Ok(())
    }

    async fn update_node(&self, node: &BlockNode) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE block_node
            SET content         = $1,
                metadata        = $2,
                position        = $3,
                status          = $4,
                parent_block_id = $5,
                slot            = $6,
                depth           = $7,
                instance_id     = $8,
                changed         = $9
            WHERE id = $10
            "#,
        )
        .bind(&node.content)
        .bind(&node.metadata)
        .bind(node.position)
        .bind(node.status)
        .bind(node.parent_block_id)
        .bind(&node.slot)
        .bind(node.depth)
        .bind(node.instance_id)
        .bind(node.changed)
        .bind(node.id)
        .execute(&self.pool)
        .await
        .context("failed to update block node")?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_depths(&self, depths: &[(Uuid, i32)]) -> Result<()> {
        if depths.is_empty() {
            return Ok(());
        }
        let (ids, values): (Vec<Uuid>, Vec<i32>) = depths.iter().copied().unzip();

        sqlx::query(
            r#"
            UPDATE block_node AS b
            SET depth = d.depth
            FROM UNNEST($1::uuid[], $2::int4[]) AS d(id, depth)
            WHERE b.id = d.id
            "#,
        )
        .bind(&ids)
        .bind(&values)
        .execute(&self.pool)
        .await
        .context("failed to update block node depths")?;

        Ok(())
    }

    async fn delete_nodes(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM block_node WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .context("failed to delete block nodes")?;

        Ok(result.rows_affected())
    }

    async fn replace_page_nodes(&self, page_id: Uuid, nodes: &[BlockNode]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to start transaction")?;

        let deleted = sqlx::query("DELETE FROM block_node WHERE page_id = $1")
            .bind(page_id)
            .execute(&mut *tx)
            .await
            .context("failed to clear page block nodes")?
            .rows_affected();

        for node in nodes {
            insert_node(&mut *tx, node).await?;
        }

        tx.commit().await.context("failed to commit transaction")?;
        Ok(deleted)
    }

    async fn insert_definition(&self, definition: &ComponentDefinition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO component_definition
                (id, name, description, category, tags, version, created_by, created)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(definition.id)
        .bind(&definition.name)
        .bind(&definition.description)
        .bind(&definition.category)
        .bind(&definition.tags)
        .bind(definition.version)
        .bind(definition.created_by)
        .bind(definition.created)
        .execute(&self.pool)
        .await
        .context("failed to create component definition")?;

        Ok(())
    }

    async fn get_definition(&self, id: Uuid) -> Result<Option<ComponentDefinition>> {
        let definition = sqlx::query_as::<_, ComponentDefinition>(
            "SELECT * FROM component_definition WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch component definition")?;

        Ok(definition)
    }

    async fn list_definitions(
        &self,
        query: &DefinitionQuery,
    ) -> Result<(Vec<ComponentDefinition>, u64)> {
        let builder = DefinitionQueryBuilder::new(query);

        let count_sql = builder.build_count();
        let total: i64 = sqlx::query_scalar(&count_sql)
            .fetch_one(&self.pool)
            .await
            .context("failed to count component definitions")?;

        let main_sql = builder.build();
        let items = sqlx::query_as::<_, ComponentDefinition>(&main_sql)
            .fetch_all(&self.pool)
            .await
            .context("failed to list component definitions")?;

        Ok((items, total.max(0) as u64))
    }

    async fn delete_definition(&self, id: Uuid) -> Result<bool> {
        // Snapshots and instances are deleted via CASCADE
        let result = sqlx::query("DELETE FROM component_definition WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to delete component definition")?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_snapshot(&self, snapshot: &ContentSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO component_snapshot
                (id, definition_id, version, tree, author, comment, created)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(snapshot.id)
        .bind(snapshot.definition_id)
        .bind(snapshot.version)
        .bind(Json(&snapshot.tree))
        .bind(snapshot.author)
        .bind(&snapshot.comment)
        .bind(snapshot.created)
        .execute(&self.pool)
        .await
        .context("failed to create component snapshot")?;

        Ok(())
    }

    async fn latest_snapshot(&self, definition_id: Uuid) -> Result<Option<ContentSnapshot>> {
        let snapshot = sqlx::query_as::<_, ContentSnapshot>(
            r#"
            SELECT * FROM component_snapshot
            WHERE definition_id = $1
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(definition_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch latest component snapshot")?;

        Ok(snapshot)
    }

    async fn list_snapshots(&self, definition_id: Uuid) -> Result<Vec<ContentSnapshot>> {
        let snapshots = sqlx::query_as::<_, ContentSnapshot>(
            "SELECT * FROM component_snapshot WHERE definition_id = $1 ORDER BY version DESC",
        )
        .bind(definition_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list component snapshots")?;

        Ok(snapshots)
    }

    async fn insert_instance(&self, instance: &ComponentInstance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO component_instance
                (id, definition_id, page_id, parent_block_id, slot, position, overrides, created, changed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(instance.id)
        .bind(instance.definition_id)
        .bind(instance.page_id)
        .bind(instance.parent_block_id)
        .bind(&instance.slot)
        .bind(instance.position)
        .bind(&instance.overrides)
        .bind(instance.created)
        .bind(instance.changed)
        .execute(&self.pool)
        .await
        .context("failed to create component instance")?;

        Ok(())
    }

    async fn get_instance(&self, id: Uuid) -> Result<Option<ComponentInstance>> {
        let instance = sqlx::query_as::<_, ComponentInstance>(
            "SELECT * FROM component_instance WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch component instance")?;

        Ok(instance)
    }

    async fn list_instances(&self, definition_id: Uuid) -> Result<Vec<ComponentInstance>> {
        let instances = sqlx::query_as::<_, ComponentInstance>(
            "SELECT * FROM component_instance WHERE definition_id = $1 ORDER BY created ASC, id ASC",
        )
        .bind(definition_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list component instances")?;

        Ok(instances)
    }

    async fn count_instances(&self, definition_id: Uuid) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM component_instance WHERE definition_id = $1")
                .bind(definition_id)
                .fetch_one(&self.pool)
                .await
                .context("failed to count component instances")?;

        Ok(count.max(0) as u64)
    }

    async fn update_instance_overrides(
        &self,
        id: Uuid,
        overrides: &serde_json::Value,
        changed: i64,
    ) -> Result<Option<ComponentInstance>> {
        let instance = sqlx::query_as::<_, ComponentInstance>(
            r#"
            UPDATE component_instance
            SET overrides = $1, changed = $2
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(overrides)
        .bind(changed)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to update component instance overrides")?;

        Ok(instance)
    }

    async fn insert_revision(&self, revision: &LayoutRevision) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO layout_revision (id, page_id, snapshot, label, created_by, created)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(revision.id)
        .bind(revision.page_id)
        .bind(Json(&revision.snapshot))
        .bind(&revision.label)
        .bind(revision.created_by)
        .bind(revision.created)
        .execute(&self.pool)
        .await
        .context("failed to create layout revision")?;

        Ok(())
    }

    async fn get_revision(&self, id: Uuid) -> Result<Option<LayoutRevision>> {
        let revision =
            sqlx::query_as::<_, LayoutRevision>("SELECT * FROM layout_revision WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("failed to fetch layout revision")?;

        Ok(revision)
    }

    async fn list_revisions(&self, page_id: Uuid) -> Result<Vec<LayoutRevision>> {
        let revisions = sqlx::query_as::<_, LayoutRevision>(
            "SELECT * FROM layout_revision WHERE page_id = $1 ORDER BY created DESC, id DESC",
        )
        .bind(page_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list layout revisions")?;

        Ok(revisions)
    }

    async fn delete_revisions(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM layout_revision WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .context("failed to delete layout revisions")?;

        Ok(result.rows_affected())
    }
}
