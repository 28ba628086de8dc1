use std::{process::ExitCode, str::FromStr, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info};

use production_planner::{
    config, db,
    entities::PlanPriority,
    errors::ServiceError,
    events,
    services::{
        plan_workflow::{PlanAggregate, PlanPreview},
        AllocationInput, CancelPlanRequest, MaterialRequirementReport, NewPlan,
    },
    AppServices,
};

#[derive(Parser)]
#[command(
    name = "production-planner",
    about = "Production plan workflow and stock reservation",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Show material requirements, costs and stock for a plan
    Preview(PlanIdArgs),
    /// Check whether current stock covers a plan
    Requirements(PlanIdArgs),
    /// Show a plan and its allocations
    Show(PlanIdArgs),
    /// Create a DRAFT plan
    Create(CreateArgs),
    /// DRAFT -> PENDING: reserve stock for a plan
    Confirm(ConfirmArgs),
    /// PENDING -> PRODUCTION: deduct reserved stock
    Start(PlanIdArgs),
    /// PRODUCTION -> COMPLETED
    Complete(CompleteArgs),
    /// Cancel a plan that has not finished
    Cancel(CancelArgs),
    /// Soft-delete a plan
    Delete(PlanIdArgs),
    /// Undo a soft delete
    Restore(PlanIdArgs),
}

#[derive(Args)]
struct PlanIdArgs {
    #[arg(help = "Production plan id")]
    plan_id: i32,
}

#[derive(Args)]
struct CreateArgs {
    #[arg(long, help = "Product to manufacture")]
    product: i32,
    #[arg(long, help = "Number of pieces to produce")]
    quantity: i32,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long, value_parser = PlanPriority::from_str, help = "LOW, MEDIUM, HIGH or URGENT")]
    priority: Option<PlanPriority>,
    #[arg(long, value_parser = parse_date, help = "Planned start date (YYYY-MM-DD)")]
    start: Option<NaiveDate>,
    #[arg(long, value_parser = parse_date, help = "Planned end date (YYYY-MM-DD)")]
    end: Option<NaiveDate>,
}

#[derive(Args)]
struct ConfirmArgs {
    #[arg(help = "Production plan id")]
    plan_id: i32,
    #[arg(
        long = "alloc",
        value_parser = parse_allocation,
        required = true,
        help = "Allocation as MATERIAL:WAREHOUSE:QTY, repeatable"
    )]
    allocations: Vec<AllocationInput>,
}

#[derive(Args)]
struct CompleteArgs {
    #[arg(help = "Production plan id")]
    plan_id: i32,
    #[arg(long, help = "Pieces actually produced")]
    actual: i32,
}

#[derive(Args)]
struct CancelArgs {
    #[arg(help = "Production plan id")]
    plan_id: i32,
    #[arg(long, help = "Why the plan is cancelled")]
    reason: String,
    #[arg(long, help = "Pieces produced before cancelling; required in production")]
    actual: Option<i32>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, json);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;

    if matches!(cli.command, Commands::Migrate) {
        db::run_migrations(&pool).await?;
        info!("Migrations applied");
        if !cli.json {
            println!("Migrations applied");
        }
        return Ok(());
    }

    if cfg.auto_migrate {
        db::run_migrations(&pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }

    let (event_sender, event_rx) = events::channel(cfg.event_channel_capacity);
    let event_task = tokio::spawn(events::process_events(event_rx));

    let services = AppServices::new(Arc::new(pool), Some(event_sender), cfg.low_stock_alerts);
    let result = dispatch(&services, cli.command, cli.json).await;

    // Closing the last sender lets the event loop drain and stop.
    drop(services);
    if let Err(e) = event_task.await {
        error!("Event processor terminated abnormally: {}", e);
    }

    result
}

async fn dispatch(services: &AppServices, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Migrate => Ok(()),
        Commands::Preview(args) => {
            let preview = services.workflow.preview_plan(args.plan_id).await?;
            output(&preview, json, render_preview)
        }
        Commands::Requirements(args) => {
            let report = services.plans.material_requirements(args.plan_id).await?;
            output(&report, json, render_requirements)
        }
        Commands::Show(args) => {
            let aggregate = services.plans.get_plan_with_allocations(args.plan_id).await?;
            output(&aggregate, json, render_aggregate)
        }
        Commands::Create(args) => {
            let plan = services
                .plans
                .create_plan(NewPlan {
                    name: args.name,
                    description: args.description,
                    product_id: args.product,
                    input_quantity: args.quantity,
                    priority: args.priority,
                    start_date: args.start,
                    end_date: args.end,
                })
                .await?;
            output(&plan, json, |plan| {
                println!(
                    "Created plan {} for product {} ({} pcs, {:?})",
                    plan.id, plan.product_id, plan.input_quantity, plan.priority
                )
            })
        }
        Commands::Confirm(args) => {
            let aggregate = services
                .workflow
                .confirm_plan(args.plan_id, args.allocations)
                .await?;
            output(&aggregate, json, render_aggregate)
        }
        Commands::Start(args) => {
            let aggregate = services.workflow.start_production(args.plan_id).await?;
            output(&aggregate, json, render_aggregate)
        }
        Commands::Complete(args) => {
            let aggregate = services
                .workflow
                .complete_plan(args.plan_id, args.actual)
                .await?;
            output(&aggregate, json, render_aggregate)
        }
        Commands::Cancel(args) => {
            let aggregate = services
                .workflow
                .cancel_plan(
                    args.plan_id,
                    CancelPlanRequest {
                        reason: args.reason,
                        actual_produced_quantity: args.actual,
                    },
                )
                .await?;
            output(&aggregate, json, render_aggregate)
        }
        Commands::Delete(args) => {
            services.plans.delete_plan(args.plan_id).await?;
            output(&serde_json::json!({ "deleted": args.plan_id }), json, |_| {
                println!("Deleted plan {}", args.plan_id)
            })
        }
        Commands::Restore(args) => {
            let plan = services.plans.restore_plan(args.plan_id).await?;
            output(&plan, json, |plan| {
                println!("Restored plan {} ({})", plan.id, plan.plan_status)
            })
        }
    }
}

fn output<T: Serialize>(value: &T, json: bool, render: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        render(value);
    }
    Ok(())
}

fn report_error(err: &anyhow::Error, json: bool) {
    match err.downcast_ref::<ServiceError>() {
        Some(service_err) if json => {
            let body = serde_json::json!({
                "error": service_err.error_code(),
                "message": service_err.to_string(),
                "retryable": service_err.is_retryable(),
            });
            eprintln!("{}", body);
        }
        Some(service_err) => eprintln!("error[{}]: {}", service_err.error_code(), service_err),
        None => eprintln!("error: {:#}", err),
    }
}

fn render_aggregate(aggregate: &PlanAggregate) {
    let plan = &aggregate.plan;
    println!(
        "Plan {} • product {} • {} pcs • status {}",
        plan.id, plan.product_id, plan.input_quantity, plan.plan_status
    );
    if let Some(cost) = plan.estimated_cost {
        println!("  estimated cost {}", cost);
    }
    if let Some(cost) = plan.actual_cost {
        println!(
            "  actual cost {} for {} pcs",
            cost,
            plan.actual_produced_quantity.unwrap_or_default()
        );
    }
    if let Some(reason) = &plan.cancel_reason {
        println!("  cancelled: {}", reason);
    }
    for a in &aggregate.allocations {
        println!(
            "  • material {} @ warehouse {} (inventory {}): allocated {} used {} returned {} @ {}",
            a.material_id,
            a.warehouse_id,
            a.inventory_id,
            a.allocated_quantity,
            a.used_quantity,
            a.returned_quantity,
            a.unit_cost
        );
    }
}

fn render_preview(preview: &PlanPreview) {
    println!(
        "Plan {} • product {} • {} pcs • estimated cost {}",
        preview.plan_id, preview.product_id, preview.input_quantity, preview.estimated_cost
    );
    for m in &preview.materials {
        println!(
            "  • {} (material {}): required {} @ {} = {}",
            m.material_name,
            m.requirement.material_id,
            m.requirement.required_quantity,
            m.unit_cost,
            m.total_cost
        );
        for stock in &m.stock_by_warehouse {
            println!(
                "      {} (inventory {}): available {} of {}",
                stock.warehouse_name, stock.inventory_id, stock.available_quantity, stock.quantity
            );
        }
    }
}

fn render_requirements(report: &MaterialRequirementReport) {
    println!(
        "Plan {} • {} of {} materials short",
        report.plan_id,
        report.insufficient_count,
        report.materials.len()
    );
    for m in &report.materials {
        let marker = if m.is_sufficient { "ok" } else { "SHORT" };
        println!(
            "  [{}] {} (material {}): required {} available {} shortage {}",
            marker,
            m.material_name,
            m.requirement.material_id,
            m.requirement.required_quantity,
            m.available_quantity,
            m.shortage_quantity
        );
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{}', expected YYYY-MM-DD", raw))
}

fn parse_allocation(raw: &str) -> Result<AllocationInput, String> {
    let parse = || -> Result<AllocationInput> {
        let mut parts = raw.split(':');
        let (Some(material), Some(warehouse), Some(quantity), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(anyhow!("expected MATERIAL:WAREHOUSE:QTY"));
        };
        Ok(AllocationInput {
            material_id: material.trim().parse().context("invalid material id")?,
            warehouse_id: warehouse.trim().parse().context("invalid warehouse id")?,
            quantity: Decimal::from_str(quantity.trim()).context("invalid quantity")?,
        })
    };
    parse().map_err(|e| format!("invalid allocation '{}': {:#}", raw, e))
}
