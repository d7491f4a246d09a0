//! # PostgreSQL Collaborators
//!
//! `PgStore` implements every collaborator trait on top of one `sqlx` pool.
//! The module also owns the schema and a handful of seeding helpers used by
//! the CLI and the database tests.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::RecipeError;
use crate::model::{
    ConsumptionLogEntry, ConsumptionSource, IngredientRef, LotStatus, NotificationRequest, Recipe,
    RecipeIngredient, StockLot, UnitRef, Visibility,
};
use crate::scope::{FamilyMembership, RecipeAccess, ScopeFilter};
use crate::store::{
    ApplyOutcome, ConsumptionLogSink, InventoryStore, LotUpdate, MembershipDirectory, Notifier,
    RecipeCatalog, RecipeQuery, SaveOutcome,
};

/// Open a connection pool
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to PostgreSQL (max {} connections)", max_connections);
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS ingredients (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create ingredients table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS units (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            abbreviation TEXT
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create units table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS family_groups (
            id UUID PRIMARY KEY,
            name TEXT
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create family_groups table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS family_members (
            family_group_id UUID NOT NULL REFERENCES family_groups(id) ON DELETE CASCADE,
            user_id UUID NOT NULL UNIQUE,
            joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (family_group_id, user_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create family_members table")?;

    // Dangling references become NULL so lots and recipes survive catalog cleanup
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS stock_lots (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL,
            family_group_id UUID,
            ingredient_id UUID REFERENCES ingredients(id) ON DELETE SET NULL,
            unit_id UUID REFERENCES units(id) ON DELETE SET NULL,
            quantity NUMERIC NOT NULL CHECK (quantity >= 0),
            expiry_date TIMESTAMPTZ,
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            version BIGINT NOT NULL DEFAULT 0
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create stock_lots table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_stock_lots_owner
         ON stock_lots (user_id, family_group_id, status)",
    )
    .execute(pool)
    .await
    .context("Failed to create stock_lots owner index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_stock_lots_family
         ON stock_lots (family_group_id) WHERE family_group_id IS NOT NULL",
    )
    .execute(pool)
    .await
    .context("Failed to create stock_lots family index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS recipes (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            servings INTEGER,
            category TEXT,
            difficulty TEXT,
            created_by UUID,
            visibility TEXT,
            is_approved BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create recipes table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS recipe_ingredients (
            recipe_id UUID NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            ingredient_id UUID REFERENCES ingredients(id) ON DELETE SET NULL,
            unit_id UUID REFERENCES units(id) ON DELETE SET NULL,
            quantity NUMERIC NOT NULL,
            note TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (recipe_id, position)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create recipe_ingredients table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS consumption_logs (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL,
            family_group_id UUID,
            ingredient_id UUID NOT NULL,
            unit_id UUID NOT NULL,
            stock_lot_id UUID NOT NULL,
            quantity NUMERIC NOT NULL,
            source TEXT NOT NULL,
            recipe_id UUID,
            consumed_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create consumption_logs table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS notifications (
            id UUID PRIMARY KEY,
            recipients UUID[] NOT NULL,
            kind TEXT NOT NULL,
            recipe_id UUID NOT NULL,
            actor_id UUID NOT NULL,
            family_group_id UUID,
            family_group_name TEXT,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create notifications table")?;

    info!("Database schema initialized successfully");
    Ok(())
}

#[derive(Debug, FromRow)]
struct StockLotRow {
    id: Uuid,
    user_id: Uuid,
    family_group_id: Option<Uuid>,
    ingredient_id: Option<Uuid>,
    ingredient_name: Option<String>,
    unit_id: Option<Uuid>,
    unit_name: Option<String>,
    unit_abbreviation: Option<String>,
    quantity: Decimal,
    expiry_date: Option<DateTime<Utc>>,
    status: String,
    created_at: DateTime<Utc>,
    version: i64,
}

fn ingredient_ref(id: Option<Uuid>, name: Option<String>) -> Option<IngredientRef> {
    match (id, name) {
        (Some(id), Some(name)) => Some(IngredientRef { id, name }),
        _ => None,
    }
}

fn unit_ref(id: Option<Uuid>, name: Option<String>, abbreviation: Option<String>) -> Option<UnitRef> {
    match (id, name) {
        (Some(id), Some(name)) => Some(UnitRef {
            id,
            name,
            abbreviation,
        }),
        _ => None,
    }
}

impl TryFrom<StockLotRow> for StockLot {
    type Error = anyhow::Error;

    fn try_from(row: StockLotRow) -> Result<Self> {
        let status = row
            .status
            .parse::<LotStatus>()
            .with_context(|| format!("Invalid status on stock lot {}", row.id))?;

        Ok(StockLot {
            id: row.id,
            user_id: row.user_id,
            family_group_id: row.family_group_id,
            ingredient: ingredient_ref(row.ingredient_id, row.ingredient_name),
            unit: unit_ref(row.unit_id, row.unit_name, row.unit_abbreviation),
            quantity: row.quantity,
            expiry_date: row.expiry_date,
            status,
            created_at: row.created_at,
            version: row.version,
        })
    }
}

const STOCK_LOT_COLUMNS: &str = "l.id, l.user_id, l.family_group_id,
    i.id AS ingredient_id, i.name AS ingredient_name,
    u.id AS unit_id, u.name AS unit_name, u.abbreviation AS unit_abbreviation,
    l.quantity, l.expiry_date, l.status, l.created_at, l.version
    FROM stock_lots l
    LEFT JOIN ingredients i ON i.id = l.ingredient_id
    LEFT JOIN units u ON u.id = l.unit_id";

#[derive(Debug, FromRow)]
struct RecipeRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    servings: Option<i32>,
    category: Option<String>,
    difficulty: Option<String>,
    created_by: Option<Uuid>,
    visibility: Option<String>,
    is_approved: bool,
}

#[derive(Debug, FromRow)]
struct RecipeIngredientRow {
    recipe_id: Uuid,
    ingredient_id: Option<Uuid>,
    ingredient_name: Option<String>,
    unit_id: Option<Uuid>,
    unit_name: Option<String>,
    unit_abbreviation: Option<String>,
    quantity: Decimal,
    note: String,
}

#[derive(Debug, FromRow)]
struct ConsumptionLogRow {
    id: Uuid,
    user_id: Uuid,
    family_group_id: Option<Uuid>,
    ingredient_id: Uuid,
    unit_id: Uuid,
    stock_lot_id: Uuid,
    quantity: Decimal,
    source: String,
    recipe_id: Option<Uuid>,
    consumed_at: DateTime<Utc>,
}

/// Every collaborator backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_ingredients(&self, recipe_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<RecipeIngredient>>> {
        let rows: Vec<RecipeIngredientRow> = sqlx::query_as(
            "SELECT ri.recipe_id,
                    i.id AS ingredient_id, i.name AS ingredient_name,
                    u.id AS unit_id, u.name AS unit_name, u.abbreviation AS unit_abbreviation,
                    ri.quantity, ri.note
             FROM recipe_ingredients ri
             LEFT JOIN ingredients i ON i.id = ri.ingredient_id
             LEFT JOIN units u ON u.id = ri.unit_id
             WHERE ri.recipe_id = ANY($1)
             ORDER BY ri.recipe_id, ri.position",
        )
        .bind(recipe_ids)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load recipe ingredients")?;

        let mut by_recipe: HashMap<Uuid, Vec<RecipeIngredient>> = HashMap::new();
        for row in rows {
            by_recipe.entry(row.recipe_id).or_default().push(RecipeIngredient {
                ingredient: ingredient_ref(row.ingredient_id, row.ingredient_name),
                unit: unit_ref(row.unit_id, row.unit_name, row.unit_abbreviation),
                quantity: row.quantity,
                note: row.note,
            });
        }
        Ok(by_recipe)
    }

    async fn assemble_recipes(&self, rows: Vec<RecipeRow>) -> Result<Vec<Recipe>> {
        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut ingredients = self.load_ingredients(&ids).await?;

        let recipes = rows
            .into_iter()
            .filter_map(|row| {
                let parsed = row
                    .visibility
                    .as_deref()
                    .map(str::parse::<Visibility>)
                    .transpose()
                    .with_context(|| format!("Invalid visibility on recipe {}", row.id));
                let visibility = match parsed {
                    Ok(visibility) => visibility,
                    Err(err) => {
                        let err = RecipeError::DataInconsistency(format!("{err:#}"));
                        warn!("Skipping recipe {}: {err}", row.id);
                        return None;
                    }
                };
                Some(Recipe {
                    ingredients: ingredients.remove(&row.id).unwrap_or_default(),
                    id: row.id,
                    name: row.name,
                    description: row.description,
                    servings: row.servings,
                    category: row.category,
                    difficulty: row.difficulty,
                    created_by: row.created_by,
                    visibility,
                    is_approved: row.is_approved,
                })
            })
            .collect();
        Ok(recipes)
    }
}

#[async_trait::async_trait]
impl InventoryStore for PgStore {
    async fn find_usable_lots(&self, scope: &ScopeFilter) -> Result<Vec<StockLot>> {
        let usable = "l.status IN ('available', 'expiring_soon') AND l.quantity > 0";
        let order = "ORDER BY l.expiry_date ASC NULLS LAST, l.created_at ASC, l.id ASC";

        let rows: Vec<StockLotRow> = match scope {
            ScopeFilter::Personal { user_id } => {
                let sql = format!(
                    "SELECT {STOCK_LOT_COLUMNS}
                     WHERE l.user_id = $1 AND l.family_group_id IS NULL AND {usable} {order}"
                );
                sqlx::query_as::<_, StockLotRow>(&sql).bind(user_id).fetch_all(&self.pool).await
            }
            ScopeFilter::Family {
                family_group_id,
                member_ids,
                ..
            } => {
                let sql = format!(
                    "SELECT {STOCK_LOT_COLUMNS}
                     WHERE (l.family_group_id = $1
                            OR (l.family_group_id IS NULL AND l.user_id = ANY($2)))
                       AND {usable} {order}"
                );
                sqlx::query_as::<_, StockLotRow>(&sql)
                    .bind(family_group_id)
                    .bind(member_ids.as_slice())
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .with_context(|| format!("Failed to load stock lots for {} scope", scope.kind()))?;

        debug!("Loaded {} usable stock lots", rows.len());
        let lots = rows
            .into_iter()
            .filter_map(|row| {
                let lot_id = row.id;
                match StockLot::try_from(row) {
                    Ok(lot) => Some(lot),
                    Err(err) => {
                        let err = RecipeError::DataInconsistency(format!("{err:#}"));
                        warn!("Skipping stock lot {lot_id}: {err}");
                        None
                    }
                }
            })
            .collect();
        Ok(lots)
    }

    async fn save_lot(&self, update: &LotUpdate) -> Result<SaveOutcome> {
        let result = sqlx::query(
            "UPDATE stock_lots SET quantity = $1, status = $2, version = version + 1
             WHERE id = $3 AND version = $4",
        )
        .bind(update.quantity)
        .bind(update.status.as_str())
        .bind(update.lot_id)
        .bind(update.expected_version)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update stock lot {}", update.lot_id))?;

        if result.rows_affected() == 1 {
            Ok(SaveOutcome::Saved)
        } else {
            Ok(SaveOutcome::Conflict)
        }
    }

    /// Writes the batch in one transaction; any conflict or error rolls it back
    async fn apply_lot_updates(&self, updates: &[LotUpdate]) -> ApplyOutcome {
        let Some(last) = updates.last() else {
            return ApplyOutcome::Applied;
        };

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(err) => {
                return ApplyOutcome::Failed {
                    lot_id: updates[0].lot_id,
                    reason: anyhow::Error::new(err).context("Failed to begin stock lot transaction"),
                }
            }
        };

        for update in updates {
            let result = sqlx::query(
                "UPDATE stock_lots SET quantity = $1, status = $2, version = version + 1
                 WHERE id = $3 AND version = $4",
            )
            .bind(update.quantity)
            .bind(update.status.as_str())
            .bind(update.lot_id)
            .bind(update.expected_version)
            .execute(&mut *tx)
            .await;

            let outcome = match result {
                Ok(done) if done.rows_affected() == 1 => continue,
                Ok(_) => ApplyOutcome::Conflict {
                    lot_id: update.lot_id,
                },
                Err(err) => ApplyOutcome::Failed {
                    lot_id: update.lot_id,
                    reason: anyhow::Error::new(err)
                        .context(format!("Failed to update stock lot {}", update.lot_id)),
                },
            };

            if let Err(err) = tx.rollback().await {
                warn!("Rollback of stock lot batch failed: {err}");
            }
            return outcome;
        }

        match tx.commit().await {
            Ok(()) => ApplyOutcome::Applied,
            Err(err) => ApplyOutcome::Failed {
                lot_id: last.lot_id,
                reason: anyhow::Error::new(err).context("Failed to commit stock lot updates"),
            },
        }
    }
}

#[async_trait::async_trait]
impl RecipeCatalog for PgStore {
    async fn find_recipe(&self, recipe_id: Uuid, access: &RecipeAccess) -> Result<Option<Recipe>> {
        let row: Option<RecipeRow> = sqlx::query_as(
            "SELECT id, name, description, servings, category, difficulty,
                    created_by, visibility, is_approved
             FROM recipes WHERE id = $1",
        )
        .bind(recipe_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load recipe {recipe_id}"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let recipe = self
            .assemble_recipes(vec![row])
            .await?
            .into_iter()
            .next()
            .filter(|recipe| access.permits(recipe));
        Ok(recipe)
    }

    async fn find_recipes(&self, access: &RecipeAccess, query: &RecipeQuery) -> Result<Vec<Recipe>> {
        let rows: Vec<RecipeRow> = sqlx::query_as(
            "SELECT id, name, description, servings, category, difficulty,
                    created_by, visibility, is_approved
             FROM recipes r
             WHERE ((r.is_approved AND (r.visibility IS NULL OR r.visibility = 'public'))
                    OR ($1::uuid IS NOT NULL AND r.created_by = $1
                        AND (r.visibility = 'private'
                             OR (r.visibility IS NULL AND NOT r.is_approved))))
               AND ($2::text IS NULL OR r.category = $2)
               AND ($3::text IS NULL OR r.difficulty = $3)
               AND ($4::integer IS NULL OR r.servings = $4)
             ORDER BY r.created_at ASC, r.id ASC",
        )
        .bind(access.viewer)
        .bind(query.category.as_deref())
        .bind(query.difficulty.as_deref())
        .bind(query.servings)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list recipes")?;

        debug!("Loaded {} visible recipes", rows.len());
        self.assemble_recipes(rows).await
    }
}

#[async_trait::async_trait]
impl ConsumptionLogSink for PgStore {
    async fn insert_entries(&self, entries: &[ConsumptionLogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO consumption_logs (id, user_id, family_group_id, ingredient_id, unit_id,
                stock_lot_id, quantity, source, recipe_id, consumed_at) ",
        );
        builder.push_values(entries, |mut row, entry| {
            row.push_bind(entry.id)
                .push_bind(entry.user_id)
                .push_bind(entry.family_group_id)
                .push_bind(entry.ingredient_id)
                .push_bind(entry.unit_id)
                .push_bind(entry.stock_lot_id)
                .push_bind(entry.quantity)
                .push_bind(entry.source.as_str())
                .push_bind(entry.recipe_id)
                .push_bind(entry.consumed_at);
        });

        builder
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to insert {} consumption log entries", entries.len()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MembershipDirectory for PgStore {
    async fn family_of(&self, user_id: Uuid) -> Result<Option<FamilyMembership>> {
        let group: Option<(Uuid, Option<String>)> = sqlx::query_as(
            "SELECT fg.id, fg.name
             FROM family_members fm
             JOIN family_groups fg ON fg.id = fm.family_group_id
             WHERE fm.user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to look up family group of user {user_id}"))?;

        let Some((family_group_id, name)) = group else {
            return Ok(None);
        };

        let member_ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM family_members
             WHERE family_group_id = $1
             ORDER BY joined_at ASC, user_id ASC",
        )
        .bind(family_group_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to list members of family group {family_group_id}"))?;

        Ok(Some(FamilyMembership {
            family_group_id,
            name,
            member_ids,
        }))
    }
}

#[async_trait::async_trait]
impl Notifier for PgStore {
    async fn notify(&self, request: &NotificationRequest) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications (id, recipients, kind, recipe_id, actor_id,
                family_group_id, family_group_name, title, message)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(Uuid::new_v4())
        .bind(request.recipients.as_slice())
        .bind(request.kind.as_str())
        .bind(request.recipe_id)
        .bind(request.actor_id)
        .bind(request.family_group_id)
        .bind(request.family_group_name.as_deref())
        .bind(&request.title)
        .bind(&request.message)
        .execute(&self.pool)
        .await
        .context("Failed to record notification")?;
        Ok(())
    }
}

/// Insert a catalog ingredient
pub async fn create_ingredient(pool: &PgPool, name: &str) -> Result<IngredientRef> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO ingredients (id, name) VALUES ($1, $2)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to insert ingredient '{name}'"))?;
    Ok(IngredientRef::new(id, name))
}

/// Insert a measurement unit
pub async fn create_unit(pool: &PgPool, name: &str, abbreviation: Option<&str>) -> Result<UnitRef> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO units (id, name, abbreviation) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(name)
        .bind(abbreviation)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to insert unit '{name}'"))?;

    let unit = UnitRef::new(id, name);
    Ok(match abbreviation {
        Some(abbreviation) => unit.with_abbreviation(abbreviation),
        None => unit,
    })
}

/// Create a family group with members in the given order
pub async fn create_family_group(pool: &PgPool, name: &str, member_ids: &[Uuid]) -> Result<FamilyMembership> {
    let family_group_id = Uuid::new_v4();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("INSERT INTO family_groups (id, name) VALUES ($1, $2)")
        .bind(family_group_id)
        .bind(name)
        .execute(&mut *tx)
        .await
        .context("Failed to insert family group")?;

    // Spread join times so membership order is stable
    for (offset, user_id) in member_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO family_members (family_group_id, user_id, joined_at)
             VALUES ($1, $2, NOW() + make_interval(secs => $3))",
        )
        .bind(family_group_id)
        .bind(user_id)
        .bind(offset as f64)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to add user {user_id} to family group"))?;
    }

    tx.commit().await.context("Failed to commit family group")?;
    info!("Created family group {} with {} members", family_group_id, member_ids.len());

    Ok(FamilyMembership {
        family_group_id,
        name: Some(name.to_string()),
        member_ids: member_ids.to_vec(),
    })
}

/// Insert a stock lot as given, including its id and version
pub async fn insert_stock_lot(pool: &PgPool, lot: &StockLot) -> Result<()> {
    sqlx::query(
        "INSERT INTO stock_lots (id, user_id, family_group_id, ingredient_id, unit_id,
            quantity, expiry_date, status, created_at, version)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(lot.id)
    .bind(lot.user_id)
    .bind(lot.family_group_id)
    .bind(lot.ingredient.as_ref().map(|ingredient| ingredient.id))
    .bind(lot.unit.as_ref().map(|unit| unit.id))
    .bind(lot.quantity)
    .bind(lot.expiry_date)
    .bind(lot.status.as_str())
    .bind(lot.created_at)
    .bind(lot.version)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to insert stock lot {}", lot.id))?;
    Ok(())
}

/// Fetch one stock lot regardless of status
pub async fn get_stock_lot(pool: &PgPool, lot_id: Uuid) -> Result<Option<StockLot>> {
    let sql = format!("SELECT {STOCK_LOT_COLUMNS} WHERE l.id = $1");
    let row: Option<StockLotRow> = sqlx::query_as(&sql)
        .bind(lot_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to read stock lot {lot_id}"))?;
    row.map(StockLot::try_from).transpose()
}

/// Insert a recipe and its ingredients in declared order
pub async fn insert_recipe(pool: &PgPool, recipe: &Recipe) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(
        "INSERT INTO recipes (id, name, description, servings, category, difficulty,
            created_by, visibility, is_approved)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(recipe.id)
    .bind(&recipe.name)
    .bind(recipe.description.as_deref())
    .bind(recipe.servings)
    .bind(recipe.category.as_deref())
    .bind(recipe.difficulty.as_deref())
    .bind(recipe.created_by)
    .bind(recipe.visibility.map(|visibility| visibility.as_str()))
    .bind(recipe.is_approved)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("Failed to insert recipe '{}'", recipe.name))?;

    for (position, ingredient) in recipe.ingredients.iter().enumerate() {
        sqlx::query(
            "INSERT INTO recipe_ingredients (recipe_id, position, ingredient_id, unit_id, quantity, note)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(recipe.id)
        .bind(position as i32)
        .bind(ingredient.ingredient.as_ref().map(|food| food.id))
        .bind(ingredient.unit.as_ref().map(|unit| unit.id))
        .bind(ingredient.quantity)
        .bind(&ingredient.note)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert ingredient {position} of recipe '{}'", recipe.name))?;
    }

    tx.commit().await.context("Failed to commit recipe")?;
    Ok(())
}

/// Consumption log entries written for a recipe, oldest first
pub async fn list_consumption_logs(pool: &PgPool, recipe_id: Uuid) -> Result<Vec<ConsumptionLogEntry>> {
    let rows: Vec<ConsumptionLogRow> = sqlx::query_as(
        "SELECT id, user_id, family_group_id, ingredient_id, unit_id, stock_lot_id,
                quantity, source, recipe_id, consumed_at
         FROM consumption_logs WHERE recipe_id = $1
         ORDER BY consumed_at ASC",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await
    .context("Failed to list consumption logs")?;

    rows.into_iter()
        .map(|row| {
            if row.source != ConsumptionSource::Recipe.as_str() {
                anyhow::bail!("Unknown consumption source '{}' on log entry {}", row.source, row.id);
            }
            Ok(ConsumptionLogEntry {
                id: row.id,
                user_id: row.user_id,
                family_group_id: row.family_group_id,
                ingredient_id: row.ingredient_id,
                unit_id: row.unit_id,
                stock_lot_id: row.stock_lot_id,
                quantity: row.quantity,
                source: ConsumptionSource::Recipe,
                recipe_id: row.recipe_id,
                consumed_at: row.consumed_at,
            })
        })
        .collect()
}

/// Number of notifications recorded for a recipe
pub async fn count_notifications(pool: &PgPool, recipe_id: Uuid) -> Result<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications WHERE recipe_id = $1")
        .bind(recipe_id)
        .fetch_one(pool)
        .await
        .context("Failed to count notifications")
}
