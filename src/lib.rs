//! Production planning engine
//!
//! Moves production plans through DRAFT, PENDING, PRODUCTION and a terminal
//! COMPLETED or CANCELLED state. Every transition reserves, deducts, returns
//! or releases material stock under row locks inside one database
//! transaction.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod common;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod repositories;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::events::EventSender;
use crate::repositories::Repositories;
use crate::services::{PlanService, PlanWorkflowService};

/// Services wired against one connection pool.
#[derive(Clone)]
pub struct AppServices {
    pub plans: PlanService,
    pub workflow: PlanWorkflowService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Option<EventSender>,
        low_stock_alerts: bool,
    ) -> Self {
        let repos = Repositories::sea_orm();
        let mut workflow =
            PlanWorkflowService::new(db.clone(), repos.clone()).with_low_stock_alerts(low_stock_alerts);
        if let Some(sender) = event_sender {
            workflow = workflow.with_event_sender(sender);
        }
        Self {
            plans: PlanService::new(db, repos),
            workflow,
        }
    }
}
