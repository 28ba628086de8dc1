mod common;

use assert_matches::assert_matches;
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::TestApp;
use production_planner::{
    entities::PlanStatus,
    errors::ServiceError,
    events::PlanEvent,
    services::{AllocationInput, CancelPlanRequest},
};

fn alloc(material_id: i32, warehouse_id: i32, quantity: Decimal) -> AllocationInput {
    AllocationInput {
        material_id,
        warehouse_id,
        quantity,
    }
}

fn cancel(reason: &str, actual: Option<i32>) -> CancelPlanRequest {
    CancelPlanRequest {
        reason: reason.to_string(),
        actual_produced_quantity: actual,
    }
}

#[tokio::test]
async fn confirm_reserves_allocated_stock() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(0.4), None, dec!(2.50), 100).await;
    let plan = app.draft_plan(bom.product.id, 100).await;

    let confirmed = app
        .workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(40))])
        .await
        .expect("confirm");

    assert_eq!(confirmed.plan.plan_status, PlanStatus::Pending);
    assert_eq!(confirmed.plan.estimated_cost.map(|c| c.round_dp(2)), Some(dec!(100)));
    assert_eq!(confirmed.allocations.len(), 1);
    assert_eq!(confirmed.allocations[0].allocated_quantity.round_dp(3), dec!(40));
    assert_eq!(confirmed.allocations[0].unit_cost.round_dp(2), dec!(2.50));
    assert_eq!(confirmed.allocations[0].inventory_id, bom.inventory.id);
    assert_eq!(app.levels(bom.inventory.id).await, (100, 40));
}

#[tokio::test]
async fn full_lifecycle_settles_usage_and_cost() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(0.4), None, dec!(2.50), 100).await;
    let plan = app.draft_plan(bom.product.id, 100).await;

    app.workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(40))])
        .await
        .expect("confirm");

    let started = app.workflow().start_production(plan.id).await.expect("start");
    assert_eq!(started.plan.plan_status, PlanStatus::Production);
    assert!(started.plan.started_at.is_some());
    assert_eq!(app.levels(bom.inventory.id).await, (60, 0));

    let completed = app.workflow().complete_plan(plan.id, 80).await.expect("complete");
    assert_eq!(completed.plan.plan_status, PlanStatus::Completed);
    assert_eq!(completed.plan.actual_produced_quantity, Some(80));
    assert_eq!(completed.plan.actual_cost.map(|c| c.round_dp(2)), Some(dec!(80)));
    assert!(completed.plan.completed_at.is_some());

    let allocation = &completed.allocations[0];
    assert_eq!(allocation.used_quantity.round_dp(3), dec!(32));
    assert_eq!(allocation.returned_quantity.round_dp(3), dec!(8));
    assert_eq!(app.levels(bom.inventory.id).await, (68, 0));
}

#[tokio::test]
async fn cancelling_a_pending_plan_releases_reservations() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(0.4), None, dec!(2.50), 100).await;
    let plan = app.draft_plan(bom.product.id, 100).await;
    app.workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(40))])
        .await
        .expect("confirm");

    let cancelled = app
        .workflow()
        .cancel_plan(plan.id, cancel("  customer withdrew  ", None))
        .await
        .expect("cancel");

    assert_eq!(cancelled.plan.plan_status, PlanStatus::Cancelled);
    assert_eq!(cancelled.plan.cancel_reason.as_deref(), Some("customer withdrew"));
    assert!(cancelled.plan.cancelled_at.is_some());
    assert_eq!(cancelled.allocations[0].used_quantity.round_dp(3), Decimal::ZERO);
    assert_eq!(cancelled.allocations[0].returned_quantity.round_dp(3), dec!(40));
    assert_eq!(app.levels(bom.inventory.id).await, (100, 0));
}

#[tokio::test]
async fn insufficient_stock_leaves_nothing_behind() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(0.4), None, dec!(2.50), 100).await;
    let plan = app.draft_plan(bom.product.id, 100).await;

    let err = app
        .workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(150))])
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InsufficientStock { requested, .. } if requested == dec!(150));
    assert_eq!(app.levels(bom.inventory.id).await, (100, 0));
    assert_eq!(app.allocation_count(plan.id).await, 0);
    assert_eq!(app.plan_status(plan.id).await, PlanStatus::Draft);
}

#[tokio::test]
async fn failure_after_partial_reservation_rolls_back() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(1), None, dec!(1), 100).await;
    let plan = app.draft_plan(bom.product.id, 100).await;

    // Each allocation fits on its own but not both together.
    let err = app
        .workflow()
        .confirm_plan(
            plan.id,
            vec![
                alloc(bom.material.id, bom.warehouse.id, dec!(60)),
                alloc(bom.material.id, bom.warehouse.id, dec!(60)),
            ],
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InsufficientStock { .. });
    assert_eq!(app.levels(bom.inventory.id).await, (100, 0));
    assert_eq!(app.allocation_count(plan.id).await, 0);
    assert_eq!(app.plan_status(plan.id).await, PlanStatus::Draft);
}

#[tokio::test]
async fn confirm_can_be_retried_after_a_failure() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(0.4), None, dec!(2.50), 100).await;
    let plan = app.draft_plan(bom.product.id, 100).await;

    let err = app
        .workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(30))])
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AllocationInsufficient { required, .. } if required == dec!(40));

    let confirmed = app
        .workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(40))])
        .await
        .expect("retry");
    assert_eq!(confirmed.allocations.len(), 1);
    assert_eq!(app.allocation_count(plan.id).await, 1);
    assert_eq!(app.levels(bom.inventory.id).await, (100, 40));
}

#[tokio::test]
async fn allocations_can_span_warehouses() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(0.5), Some(dec!(0.1)), dec!(4), 30).await;
    let second = app.warehouse("Overflow").await;
    let overflow = app.inventory(bom.material.id, second.id, 50, 10).await;
    // 0.5 * 100 = 50 net, 5 scrap
    let plan = app.draft_plan(bom.product.id, 100).await;

    let confirmed = app
        .workflow()
        .confirm_plan(
            plan.id,
            vec![
                alloc(bom.material.id, bom.warehouse.id, dec!(25)),
                alloc(bom.material.id, second.id, dec!(30)),
            ],
        )
        .await
        .expect("confirm");

    assert_eq!(confirmed.allocations.len(), 2);
    assert_eq!(confirmed.plan.estimated_cost.map(|c| c.round_dp(2)), Some(dec!(220)));
    assert_eq!(app.levels(bom.inventory.id).await, (30, 25));
    assert_eq!(app.levels(overflow.id).await, (50, 40));
}

#[tokio::test]
async fn cancelling_in_production_settles_like_completion() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(0.4), None, dec!(2.50), 100).await;
    let plan = app.draft_plan(bom.product.id, 100).await;
    app.workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(40))])
        .await
        .expect("confirm");
    app.workflow().start_production(plan.id).await.expect("start");

    let err = app
        .workflow()
        .cancel_plan(plan.id, cancel("line stopped", None))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));

    let cancelled = app
        .workflow()
        .cancel_plan(plan.id, cancel("line stopped", Some(25)))
        .await
        .expect("cancel");

    assert_eq!(cancelled.plan.plan_status, PlanStatus::Cancelled);
    assert_eq!(cancelled.plan.actual_produced_quantity, Some(25));
    assert_eq!(cancelled.plan.actual_cost.map(|c| c.round_dp(2)), Some(dec!(25)));
    assert_eq!(cancelled.allocations[0].used_quantity.round_dp(3), dec!(10));
    assert_eq!(cancelled.allocations[0].returned_quantity.round_dp(3), dec!(30));
    assert_eq!(app.levels(bom.inventory.id).await, (90, 0));
}

#[tokio::test]
async fn completing_with_zero_output_returns_everything() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(2), None, dec!(1.25), 500).await;
    let plan = app.draft_plan(bom.product.id, 50).await;
    app.workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(100))])
        .await
        .expect("confirm");
    app.workflow().start_production(plan.id).await.expect("start");
    assert_eq!(app.levels(bom.inventory.id).await, (400, 0));

    let completed = app.workflow().complete_plan(plan.id, 0).await.expect("complete");
    assert_eq!(completed.plan.actual_cost.map(|c| c.round_dp(2)), Some(Decimal::ZERO));
    assert_eq!(app.levels(bom.inventory.id).await, (500, 0));
}

#[rstest]
#[case::above_input(101)]
#[case::negative(-1)]
#[tokio::test]
async fn complete_rejects_out_of_range_output(#[case] actual: i32) {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(0.4), None, dec!(2.50), 100).await;
    let plan = app.draft_plan(bom.product.id, 100).await;
    app.workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(40))])
        .await
        .expect("confirm");
    app.workflow().start_production(plan.id).await.expect("start");

    let err = app.workflow().complete_plan(plan.id, actual).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));
    assert_eq!(app.plan_status(plan.id).await, PlanStatus::Production);
    assert_eq!(app.levels(bom.inventory.id).await, (60, 0));
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Confirm,
    Start,
    Complete,
}

#[rstest]
#[case::start_a_draft(PlanStatus::Draft, Step::Start)]
#[case::complete_a_draft(PlanStatus::Draft, Step::Complete)]
#[case::confirm_twice(PlanStatus::Pending, Step::Confirm)]
#[case::complete_before_start(PlanStatus::Pending, Step::Complete)]
#[case::start_twice(PlanStatus::Production, Step::Start)]
#[case::confirm_in_production(PlanStatus::Production, Step::Confirm)]
#[case::restart_completed(PlanStatus::Completed, Step::Start)]
#[tokio::test]
async fn transitions_out_of_order_are_rejected(#[case] from: PlanStatus, #[case] step: Step) {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(1), None, dec!(1), 1000).await;
    let plan = app.draft_plan(bom.product.id, 10).await;
    let allocation = vec![alloc(bom.material.id, bom.warehouse.id, dec!(10))];

    if from != PlanStatus::Draft {
        app.workflow()
            .confirm_plan(plan.id, allocation.clone())
            .await
            .expect("confirm");
    }
    if matches!(from, PlanStatus::Production | PlanStatus::Completed) {
        app.workflow().start_production(plan.id).await.expect("start");
    }
    if from == PlanStatus::Completed {
        app.workflow().complete_plan(plan.id, 10).await.expect("complete");
    }
    let before = app.levels(bom.inventory.id).await;

    let result = match step {
        Step::Confirm => app.workflow().confirm_plan(plan.id, allocation).await,
        Step::Start => app.workflow().start_production(plan.id).await,
        Step::Complete => app.workflow().complete_plan(plan.id, 10).await,
    };

    assert_matches!(result, Err(ServiceError::InvalidState(_)));
    assert_eq!(app.plan_status(plan.id).await, from);
    assert_eq!(app.levels(bom.inventory.id).await, before);
}

#[rstest]
#[case::completed(true)]
#[case::cancelled(false)]
#[tokio::test]
async fn finished_plans_cannot_be_cancelled(#[case] complete: bool) {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(1), None, dec!(1), 100).await;
    let plan = app.draft_plan(bom.product.id, 10).await;
    if complete {
        app.workflow()
            .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(10))])
            .await
            .expect("confirm");
        app.workflow().start_production(plan.id).await.expect("start");
        app.workflow().complete_plan(plan.id, 10).await.expect("complete");
    } else {
        app.workflow()
            .cancel_plan(plan.id, cancel("first", None))
            .await
            .expect("cancel");
    }

    let err = app
        .workflow()
        .cancel_plan(plan.id, cancel("again", None))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidState(_));
}

#[tokio::test]
async fn cancel_requires_a_reason() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(1), None, dec!(1), 100).await;
    let plan = app.draft_plan(bom.product.id, 10).await;

    for reason in ["", "   "] {
        let err = app
            .workflow()
            .cancel_plan(plan.id, cancel(reason, None))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidInput(_));
    }
    assert_eq!(app.plan_status(plan.id).await, PlanStatus::Draft);
}

#[tokio::test]
async fn cancelling_a_draft_rejects_produced_quantity() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(1), None, dec!(1), 100).await;
    let plan = app.draft_plan(bom.product.id, 10).await;

    let err = app
        .workflow()
        .cancel_plan(plan.id, cancel("wrong product", Some(3)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));

    let cancelled = app
        .workflow()
        .cancel_plan(plan.id, cancel("wrong product", Some(0)))
        .await
        .expect("cancel");
    assert_eq!(cancelled.plan.plan_status, PlanStatus::Cancelled);
    assert!(cancelled.allocations.is_empty());
}

#[tokio::test]
async fn confirm_validates_allocation_sources() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(1), None, dec!(1), 100).await;
    let closed = app.warehouse_with_status("Closed", false).await;
    app.inventory(bom.material.id, closed.id, 100, 0).await;
    let empty = app.warehouse("Empty").await;
    let other = app.material("copper", dec!(3), Decimal::ZERO).await;
    let plan = app.draft_plan(bom.product.id, 10).await;

    let cases = [
        (vec![alloc(bom.material.id, bom.warehouse.id, Decimal::ZERO)], "zero quantity"),
        (vec![alloc(bom.material.id, closed.id, dec!(10))], "inactive warehouse"),
        (
            vec![
                alloc(bom.material.id, bom.warehouse.id, dec!(10)),
                alloc(other.id, bom.warehouse.id, dec!(1)),
            ],
            "material outside the BOM",
        ),
    ];
    for (allocations, label) in cases {
        let result = app.workflow().confirm_plan(plan.id, allocations).await;
        assert!(
            matches!(result, Err(ServiceError::InvalidInput(_))),
            "{} should be invalid input, got {:?}",
            label,
            result
        );
    }

    let missing = app
        .workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, empty.id, dec!(10))])
        .await;
    assert_matches!(missing, Err(ServiceError::NotFound(_)));

    let unknown = app
        .workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, 9_999, dec!(10))])
        .await;
    assert_matches!(unknown, Err(ServiceError::NotFound(_)));

    assert_eq!(app.levels(bom.inventory.id).await, (100, 0));
    assert_eq!(app.plan_status(plan.id).await, PlanStatus::Draft);
}

#[tokio::test]
async fn events_follow_commits_in_order() {
    let mut app = TestApp::new().await;
    let bom = app.simple_bom(dec!(0.4), None, dec!(2.50), 100).await;
    let plan = app.draft_plan(bom.product.id, 100).await;

    // A rejected transition publishes nothing.
    let _ = app.workflow().start_production(plan.id).await;
    assert!(app.drain_events().is_empty());

    app.workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(40))])
        .await
        .expect("confirm");
    app.workflow().start_production(plan.id).await.expect("start");
    app.workflow().complete_plan(plan.id, 100).await.expect("complete");

    let names: Vec<&str> = app.drain_events().iter().map(PlanEvent::name).collect();
    assert_eq!(names, ["plan_confirmed", "production_started", "plan_completed"]);
}

#[tokio::test]
async fn low_stock_is_reported_after_confirmation() {
    let mut app = TestApp::new().await;
    let product = app.product("Bracket").await;
    let material = app.material("aluminium", dec!(5), dec!(70)).await;
    let warehouse = app.warehouse("Main").await;
    app.bom_line(product.id, material.id, dec!(0.4), None).await;
    let inventory = app.inventory(material.id, warehouse.id, 100, 0).await;
    let plan = app.draft_plan(product.id, 100).await;

    app.workflow()
        .confirm_plan(plan.id, vec![alloc(material.id, warehouse.id, dec!(40))])
        .await
        .expect("confirm");

    let events = app.drain_events();
    assert_eq!(events.len(), 2);
    assert_matches!(events[0], PlanEvent::PlanConfirmed { plan_id, allocation_count: 1, .. } if plan_id == plan.id);
    assert_matches!(
        &events[1],
        PlanEvent::LowStockDetected { inventory_id, available: 60, .. } if *inventory_id == inventory.id
    );
}

#[tokio::test]
async fn low_stock_alerts_can_be_disabled() {
    let mut app = TestApp::with_low_stock_alerts(false).await;
    let product = app.product("Bracket").await;
    let material = app.material("aluminium", dec!(5), dec!(70)).await;
    let warehouse = app.warehouse("Main").await;
    app.bom_line(product.id, material.id, dec!(0.4), None).await;
    app.inventory(material.id, warehouse.id, 100, 0).await;
    let plan = app.draft_plan(product.id, 100).await;

    app.workflow()
        .confirm_plan(plan.id, vec![alloc(material.id, warehouse.id, dec!(40))])
        .await
        .expect("confirm");

    let names: Vec<&str> = app.drain_events().iter().map(PlanEvent::name).collect();
    assert_eq!(names, ["plan_confirmed"]);
}

#[tokio::test]
async fn deleted_plans_are_invisible_until_restored() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(0.4), None, dec!(2.50), 100).await;
    let plan = app.draft_plan(bom.product.id, 100).await;

    app.plans().delete_plan(plan.id).await.expect("delete");
    assert_matches!(app.plans().get_plan(plan.id).await, Err(ServiceError::NotFound(_)));
    assert_matches!(
        app.workflow()
            .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(40))])
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(app.plans().delete_plan(plan.id).await, Err(ServiceError::NotFound(_)));
    assert_eq!(app.levels(bom.inventory.id).await, (100, 0));

    let restored = app.plans().restore_plan(plan.id).await.expect("restore");
    assert_eq!(restored.plan_status, PlanStatus::Draft);
    assert!(restored.deleted_at.is_none());
    assert_matches!(app.plans().restore_plan(plan.id).await, Err(ServiceError::NotFound(_)));

    app.workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(40))])
        .await
        .expect("confirm after restore");
}

#[tokio::test]
async fn preview_reports_costs_and_stock_without_writing() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(0.4), Some(dec!(0.05)), dec!(2.50), 100).await;
    let second = app.warehouse("Annex").await;
    app.inventory(bom.material.id, second.id, 20, 20).await;
    let plan = app.draft_plan(bom.product.id, 100).await;

    let preview = app.workflow().preview_plan(plan.id).await.expect("preview");

    assert_eq!(preview.plan_id, plan.id);
    assert_eq!(preview.materials.len(), 1);
    let material = &preview.materials[0];
    assert_eq!(material.material_name, "steel");
    assert_eq!(material.requirement.required_quantity, dec!(42));
    assert_eq!(material.total_cost, dec!(105));
    assert_eq!(preview.estimated_cost, dec!(105));
    // Fully reserved rows are not offered as sources.
    assert_eq!(material.stock_by_warehouse.len(), 1);
    assert_eq!(material.stock_by_warehouse[0].available_quantity, 100);

    assert_eq!(app.plan_status(plan.id).await, PlanStatus::Draft);
    assert_eq!(app.levels(bom.inventory.id).await, (100, 0));
}

#[tokio::test]
async fn requirements_report_shortages() {
    let app = TestApp::new().await;
    let product = app.product("Frame").await;
    let steel = app.material("steel", dec!(2), Decimal::ZERO).await;
    let bolts = app.material("bolts", dec!(0.1), Decimal::ZERO).await;
    let main = app.warehouse("Main").await;
    let annex = app.warehouse("Annex").await;
    app.bom_line(product.id, steel.id, dec!(1.5), None).await;
    app.bom_line(product.id, bolts.id, dec!(4), None).await;
    app.inventory(steel.id, main.id, 10, 0).await;
    app.inventory(steel.id, annex.id, 10, 2).await;
    app.inventory(bolts.id, main.id, 30, 0).await;
    let plan = app.draft_plan(product.id, 10).await;

    let report = app.plans().material_requirements(plan.id).await.expect("report");

    assert!(!report.all_materials_sufficient);
    assert_eq!(report.insufficient_count, 1);
    let steel_row = report
        .materials
        .iter()
        .find(|m| m.requirement.material_id == steel.id)
        .expect("steel row");
    assert!(steel_row.is_sufficient);
    assert_eq!(steel_row.available_quantity, dec!(18));
    assert_eq!(steel_row.shortage_quantity, Decimal::ZERO);

    let bolt_row = report
        .materials
        .iter()
        .find(|m| m.requirement.material_id == bolts.id)
        .expect("bolt row");
    assert!(!bolt_row.is_sufficient);
    assert_eq!(bolt_row.shortage_quantity, dec!(10));
}

#[tokio::test]
async fn plan_creation_checks_product_and_bom() {
    let app = TestApp::new().await;
    let bare = app.product("No BOM").await;

    assert_matches!(
        app.plans()
            .create_plan(production_planner::services::NewPlan {
                product_id: bare.id,
                input_quantity: 5,
                ..Default::default()
            })
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        app.plans()
            .create_plan(production_planner::services::NewPlan {
                product_id: 9_999,
                input_quantity: 5,
                ..Default::default()
            })
            .await,
        Err(ServiceError::NotFound(_))
    );

    let bom = app.simple_bom(dec!(1), None, dec!(1), 10).await;
    assert_matches!(
        app.plans()
            .create_plan(production_planner::services::NewPlan {
                product_id: bom.product.id,
                input_quantity: 0,
                ..Default::default()
            })
            .await,
        Err(ServiceError::InvalidInput(_))
    );

    let plan = app.draft_plan(bom.product.id, 5).await;
    assert_eq!(plan.plan_status, PlanStatus::Draft);
    assert_eq!(plan.priority, production_planner::entities::PlanPriority::Medium);
}

#[tokio::test]
async fn fractional_allocation_with_no_output_restores_stock() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(0.5), None, dec!(3), 10).await;
    let plan = app.draft_plan(bom.product.id, 1).await;

    app.workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(0.5))])
        .await
        .expect("confirm");
    assert_eq!(app.levels(bom.inventory.id).await, (10, 1));

    app.workflow().start_production(plan.id).await.expect("start");
    assert_eq!(app.levels(bom.inventory.id).await, (9, 0));

    let completed = app.workflow().complete_plan(plan.id, 0).await.expect("complete");
    assert_eq!(completed.allocations[0].returned_quantity.round_dp(3), dec!(0.5));
    assert_eq!(app.levels(bom.inventory.id).await, (10, 0));
}

#[tokio::test]
async fn fractional_reservation_is_fully_released_on_cancel() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(0.5), None, dec!(3), 10).await;
    let plan = app.draft_plan(bom.product.id, 3).await;

    app.workflow()
        .confirm_plan(plan.id, vec![alloc(bom.material.id, bom.warehouse.id, dec!(1.5))])
        .await
        .expect("confirm");
    assert_eq!(app.levels(bom.inventory.id).await, (10, 2));

    app.workflow()
        .cancel_plan(plan.id, cancel("postponed", None))
        .await
        .expect("cancel");
    assert_eq!(app.levels(bom.inventory.id).await, (10, 0));
}

#[tokio::test]
async fn inactive_warehouses_are_not_counted_as_sources() {
    let app = TestApp::new().await;
    let bom = app.simple_bom(dec!(2), None, dec!(1), 10).await;
    let closed = app.warehouse_with_status("Closed", false).await;
    app.inventory(bom.material.id, closed.id, 50, 0).await;
    let plan = app.draft_plan(bom.product.id, 10).await;

    let preview = app.workflow().preview_plan(plan.id).await.expect("preview");
    let sources = &preview.materials[0].stock_by_warehouse;
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].warehouse_id, bom.warehouse.id);

    let report = app.plans().material_requirements(plan.id).await.expect("report");
    assert!(!report.all_materials_sufficient);
    assert_eq!(report.materials[0].available_quantity, dec!(10));
    assert_eq!(report.materials[0].shortage_quantity, dec!(10));
}
