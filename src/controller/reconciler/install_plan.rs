//! # Install Plan Approval
//!
//! OLM creates InstallPlans asynchronously for a manually approved
//! Subscription. This step finds the plan that installs the target CSV and
//! flips its `approved` flag, once per plan.
//!
//! A plan is considered for approval only after OLM has resolved it (its
//! status carries bundle lookups). Plans for other versions are ignored.
//! While no eligible plan exists the step waits for the next trigger: the
//! InstallPlan watch fires again when OLM fills in the status.

use async_trait::async_trait;
use tracing::{debug, info};

use super::pipeline::{ReconcileContext, Step};
use super::result::{update_result, ReconcileResult};
use crate::crd::InstallPlan;
use crate::observability::metrics;
use crate::store::{ObjectKey, ObjectStore, Selector};

/// Approval state of a plan relative to a target CSV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    /// Targets the CSV but OLM has not resolved it yet
    Pending,
    MatchedUnapproved,
    MatchedApproved,
    /// Targets some other version
    Irrelevant,
}

pub fn plan_state(plan: &InstallPlan, target_csv: &str) -> PlanState {
    if !plan
        .spec
        .cluster_service_version_names
        .iter()
        .any(|csv| csv == target_csv)
    {
        return PlanState::Irrelevant;
    }
    let resolved = plan
        .status
        .as_ref()
        .is_some_and(|status| !status.bundle_lookups.is_empty());
    match (resolved, plan.spec.approved) {
        (false, _) => PlanState::Pending,
        (true, false) => PlanState::MatchedUnapproved,
        (true, true) => PlanState::MatchedApproved,
    }
}

/// Pipeline step approving the InstallPlan for a target CSV
#[derive(Debug, Clone)]
pub struct ApproveInstallPlan {
    namespace: String,
    target_csv: String,
}

impl ApproveInstallPlan {
    pub fn new(namespace: impl Into<String>, target_csv: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            target_csv: target_csv.into(),
        }
    }
}

#[async_trait]
impl<C: ReconcileContext> Step<C> for ApproveInstallPlan {
    fn name(&self) -> &str {
        "install-plan"
    }

    async fn execute(&self, ctx: &C) -> ReconcileResult {
        let plans = match ctx
            .store()
            .list::<InstallPlan>(Some(&self.namespace), &Selector::everything())
            .await
        {
            Ok(plans) => plans,
            Err(e) => return ReconcileResult::error(e),
        };

        if plans.is_empty() {
            debug!(namespace = %self.namespace, "waiting for install plans to be created");
            return ReconcileResult::end();
        }

        let eligible = plans.into_iter().find_map(|plan| {
            match plan_state(&plan, &self.target_csv) {
                PlanState::MatchedUnapproved | PlanState::MatchedApproved => Some(plan),
                PlanState::Pending | PlanState::Irrelevant => None,
            }
        });

        let Some(mut plan) = eligible else {
            debug!(csv = %self.target_csv, "no resolved install plan for target version yet");
            return ReconcileResult::end();
        };

        let key = ObjectKey::of(&plan);
        if plan.spec.approved {
            debug!(plan = %key, csv = %self.target_csv, "install plan already approved");
            return ReconcileResult::next();
        }

        info!(plan = %key, csv = %self.target_csv, "approving install plan");
        plan.spec.approved = true;
        let result = ctx.store().update(&plan).await;
        if result.is_ok() {
            metrics::increment_install_plans_approved();
            metrics::increment_writes("InstallPlan", "update");
            return ReconcileResult::end();
        }
        update_result(result, ctx.conflict_requeue())
    }
}
