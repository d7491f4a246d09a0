use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use fridge_recipes::config::{EngineConfig, LogFormat};
use fridge_recipes::db::{self, PgStore};
use fridge_recipes::logging::init_tracing;
use fridge_recipes::memory::InMemoryStore;
use fridge_recipes::model::{IngredientRef, LotStatus, Recipe, RecipeIngredient, StockLot, UnitRef};
use fridge_recipes::scope::{Actor, FamilyMembership, ScopeKind};
use fridge_recipes::store::RecipeQuery;
use fridge_recipes::{Collaborators, RecipeEngine, RecipeError};

#[derive(Parser, Debug)]
#[command(name = "fridge-recipes")]
#[command(about = "Recipe suggestions and stock consumption for shared fridges")]
struct Cli {
    /// Log output format (pretty or json)
    #[arg(long, env = "FRIDGE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct Caller {
    /// Acting user id
    #[arg(long)]
    user: Uuid,

    /// Whose fridge to use (personal or family)
    #[arg(long, default_value = "personal")]
    scope: ScopeKind,
}

#[derive(Args, Debug, Clone, Default)]
struct Filters {
    #[arg(long)]
    category: Option<String>,

    #[arg(long)]
    difficulty: Option<String>,

    #[arg(long)]
    servings: Option<i32>,
}

impl From<Filters> for RecipeQuery {
    fn from(filters: Filters) -> Self {
        RecipeQuery {
            category: filters.category,
            difficulty: filters.difficulty,
            servings: filters.servings,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database tables
    InitDb,
    /// Rank recipes against the caller's fridge
    Suggest {
        #[command(flatten)]
        caller: Caller,
        #[command(flatten)]
        filters: Filters,
    },
    /// Show available and missing ingredients for one recipe
    Check {
        #[command(flatten)]
        caller: Caller,
        #[arg(long)]
        recipe: Uuid,
    },
    /// Cook a recipe and consume its ingredients
    Cook {
        #[command(flatten)]
        caller: Caller,
        #[arg(long)]
        recipe: Uuid,
        /// Name shown to family members
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        locale: Option<String>,
    },
    /// Rank recipes by the ingredient ids given
    Search {
        #[arg(long)]
        user: Option<Uuid>,
        #[arg(long = "ingredient")]
        ingredients: Vec<Uuid>,
        #[command(flatten)]
        filters: Filters,
    },
    /// Run a suggest / check / cook round against an in-memory fridge
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = EngineConfig::from_env()?;
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    if cli.database_url.is_some() {
        config.database.url = cli.database_url.clone();
    }
    init_tracing(config.log_format)?;

    info!("Starting fridge-recipes");

    match cli.command {
        Command::InitDb => {
            let pool = connect(&config).await?;
            db::init_database_schema(&pool).await?;
        }
        Command::Suggest { caller, filters } => {
            let engine = postgres_engine(&config).await?;
            let actor = Actor::new(caller.user);
            let result = engine.suggest(&actor, caller.scope, &filters.into()).await;
            print_result(result)?;
        }
        Command::Check { caller, recipe } => {
            let engine = postgres_engine(&config).await?;
            let actor = Actor::new(caller.user);
            let result = engine.check_ingredients(&actor, caller.scope, recipe).await;
            print_result(result)?;
        }
        Command::Cook {
            caller,
            recipe,
            display_name,
            locale,
        } => {
            let engine = postgres_engine(&config).await?;
            let mut actor = Actor::new(caller.user);
            actor.display_name = display_name;
            actor.locale = locale;
            let result = engine.cook(&actor, caller.scope, recipe).await;
            print_result(result)?;
        }
        Command::Search {
            user,
            ingredients,
            filters,
        } => {
            let engine = postgres_engine(&config).await?;
            let viewer = user.map(Actor::new);
            let result = engine
                .search_by_ingredients(viewer.as_ref(), &ingredients, &filters.into())
                .await;
            print_result(result)?;
        }
        Command::Demo => run_demo(&config).await?,
    }

    Ok(())
}

async fn connect(config: &EngineConfig) -> Result<sqlx::PgPool> {
    let url = config
        .database
        .url
        .as_deref()
        .context("DATABASE_URL must be set")?;
    db::connect(url, config.database.max_connections).await
}

async fn postgres_engine(config: &EngineConfig) -> Result<RecipeEngine> {
    let pool = connect(config).await?;
    RecipeEngine::new(Collaborators::from_store(PgStore::new(pool)), config)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error: &'static str,
    message: String,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing_ingredients: Option<&'a [fridge_recipes::matcher::MissingIngredient]>,
}

fn print_result<T: Serialize>(result: Result<T, RecipeError>) -> Result<()> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            error!("{err}");
            let missing = match &err {
                RecipeError::InsufficientStock { missing, .. } => Some(missing.as_slice()),
                _ => None,
            };
            let body = ErrorBody {
                error: err.code(),
                message: err.to_string(),
                retryable: err.is_retryable(),
                missing_ingredients: missing,
            };
            println!("{}", serde_json::to_string_pretty(&body)?);
            std::process::exit(2);
        }
    }
}

async fn run_demo(config: &EngineConfig) -> Result<()> {
    let store = InMemoryStore::new();
    let now = Utc::now();
    let qty = |value: i64, scale: u32| Decimal::new(value, scale);

    let mai = Uuid::new_v4();
    let khoa = Uuid::new_v4();
    let family = FamilyMembership {
        family_group_id: Uuid::new_v4(),
        name: Some("Nguyen".to_string()),
        member_ids: vec![mai, khoa],
    };
    store.add_family(family.clone()).await;

    let tomato = IngredientRef::new(Uuid::new_v4(), "tomato");
    let egg = IngredientRef::new(Uuid::new_v4(), "egg");
    let rice = IngredientRef::new(Uuid::new_v4(), "rice");
    let fish_sauce = IngredientRef::new(Uuid::new_v4(), "fish sauce");
    let kg = UnitRef::new(Uuid::new_v4(), "kilogram").with_abbreviation("kg");
    let piece = UnitRef::new(Uuid::new_v4(), "piece");
    let ml = UnitRef::new(Uuid::new_v4(), "milliliter").with_abbreviation("ml");

    let lots = [
        StockLot::new(mai, tomato.clone(), kg.clone(), qty(6, 1), now + Duration::days(1))
            .in_family(family.family_group_id)
            .with_status(LotStatus::ExpiringSoon),
        StockLot::new(khoa, tomato.clone(), kg.clone(), qty(1, 0), now + Duration::days(8)),
        StockLot::new(khoa, egg.clone(), piece.clone(), qty(6, 0), now + Duration::days(2))
            .with_status(LotStatus::ExpiringSoon),
        StockLot::new(mai, rice.clone(), kg.clone(), qty(2, 0), now + Duration::days(180))
            .in_family(family.family_group_id),
    ];
    for lot in lots {
        store.add_lot(lot).await;
    }

    let tomato_eggs = Recipe::new(Uuid::new_v4(), "Tomato scrambled eggs")
        .with_category("main")
        .with_ingredient(RecipeIngredient::new(tomato.clone(), kg.clone(), qty(8, 1)))
        .with_ingredient(RecipeIngredient::new(egg.clone(), piece.clone(), qty(3, 0)));
    let fried_rice = Recipe::new(Uuid::new_v4(), "Egg fried rice")
        .with_category("main")
        .with_ingredient(RecipeIngredient::new(rice.clone(), kg.clone(), qty(5, 1)))
        .with_ingredient(RecipeIngredient::new(egg.clone(), piece.clone(), qty(2, 0)))
        .with_ingredient(RecipeIngredient::new(fish_sauce.clone(), ml.clone(), qty(15, 0)));
    let cooked_id = tomato_eggs.id;
    store.add_recipe(tomato_eggs).await;
    store.add_recipe(fried_rice).await;

    let engine = RecipeEngine::new(Collaborators::from_store(store.clone()), config)?;
    let actor = Actor::new(mai).with_display_name("Mai");

    let suggestions = engine
        .suggest(&actor, ScopeKind::Family, &RecipeQuery::default())
        .await?;
    println!("{}", serde_json::to_string_pretty(&suggestions)?);

    let check = engine
        .check_ingredients(&actor, ScopeKind::Family, cooked_id)
        .await?;
    println!("{}", serde_json::to_string_pretty(&check)?);

    let outcome = engine.cook(&actor, ScopeKind::Family, cooked_id).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    let notifications = store.notifications().await;
    println!("{}", serde_json::to_string_pretty(&notifications)?);

    Ok(())
}
