/// Workflow preparation: graph validation and parent-count computation
///
/// Compiles an authored workflow into execution-ready form:
/// - builds a petgraph DAG from steps and sub-step edges, rejecting cycles
/// - computes each step's required-parent-count by counting how many other
///   steps list it as a sub-step, writing the count into every parent edge
/// - synthesizes the root step (-1) whose sub-steps are all zero-parent steps

use crate::workflow::types::{Step, SubStep, Workflow, ROOT_STEP};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use thiserror::Error;

/// Validation failures raised while preparing a workflow
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("workflow '{0}' contains a cycle - must be a DAG")]
    Cyclic(String),
    #[error("workflow '{0}' has duplicate step number {1}")]
    DuplicateStep(String, i32),
    #[error("workflow '{0}': step {1} references unknown sub-step {2}")]
    UnknownSubStep(String, i32, i32),
    #[error("workflow '{0}': step number {1} is reserved for the root step")]
    ReservedNumber(String, i32),
    #[error("workflow '{0}' has no steps")]
    Empty(String),
}

/// Execution-ready workflow with computed parent counts and a root step
///
/// This is the in-memory form served by the registry; `step()` is the
/// step-config lookup the engine uses, with the root sentinel resolving
/// to the synthesized container step.
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    /// Workflow definition with parent counts filled in
    pub workflow: Workflow,
    /// Synthetic root step fanning out to all zero-parent steps
    pub root: Step,
    /// Step lookup by number
    steps: HashMap<i32, Step>,
}

impl CompiledWorkflow {
    /// Look up a step definition by number; `ROOT_STEP` resolves to the
    /// synthesized root.
    pub fn step(&self, number: i32) -> Option<&Step> {
        if number == ROOT_STEP {
            Some(&self.root)
        } else {
            self.steps.get(&number)
        }
    }

    pub fn name(&self) -> &str {
        &self.workflow.name
    }
}

/// Compile a workflow: validate the DAG and fill in parent counts.
pub fn prepare(mut workflow: Workflow) -> Result<CompiledWorkflow, PrepareError> {
    if workflow.steps.is_empty() {
        return Err(PrepareError::Empty(workflow.name));
    }

    // Unique, non-reserved step numbers
    let mut indices: HashMap<i32, NodeIndex> = HashMap::new();
    let mut graph: DiGraph<i32, ()> = DiGraph::new();
    for step in &workflow.steps {
        if step.number == ROOT_STEP {
            return Err(PrepareError::ReservedNumber(workflow.name.clone(), step.number));
        }
        if indices.contains_key(&step.number) {
            return Err(PrepareError::DuplicateStep(workflow.name.clone(), step.number));
        }
        let idx = graph.add_node(step.number);
        indices.insert(step.number, idx);
    }

    // Edges + in-edge counting: a child's required parent count is the
    // number of steps that list it as a sub-step
    let mut parent_counts: HashMap<i32, u32> = HashMap::new();
    for step in &workflow.steps {
        let from = indices[&step.number];
        for sub in &step.sub_steps {
            let to = *indices.get(&sub.step_number).ok_or(PrepareError::UnknownSubStep(
                workflow.name.clone(),
                step.number,
                sub.step_number,
            ))?;
            graph.add_edge(from, to, ());
            *parent_counts.entry(sub.step_number).or_insert(0) += 1;
        }
    }

    if toposort(&graph, None).is_err() {
        return Err(PrepareError::Cyclic(workflow.name));
    }

    // Write computed counts back into every parent's edge list
    for step in &mut workflow.steps {
        for sub in &mut step.sub_steps {
            sub.required_parent_count = parent_counts.get(&sub.step_number).copied().unwrap_or(0);
        }
    }

    // Root step fans out to everything with no parents
    let root_children: Vec<SubStep> = workflow
        .steps
        .iter()
        .filter(|s| !parent_counts.contains_key(&s.number))
        .map(|s| SubStep {
            step_number: s.number,
            required_parent_count: 1,
        })
        .collect();

    let root = Step {
        number: ROOT_STEP,
        step_id: "root".to_string(),
        callout_url: None,
        method: Default::default(),
        callout_timeout_secs: 0,
        sub_steps: root_children,
        retry: None,
        callback: None,
        webhook: None,
        scale_group: None,
        stop_on_action_failed: false,
        stop_on_webhook_failed: false,
        forward_response_data: false,
    };

    let steps = workflow
        .steps
        .iter()
        .map(|s| (s.number, s.clone()))
        .collect();

    tracing::debug!(
        "Prepared workflow '{}': {} steps, {} root children",
        workflow.name,
        workflow.steps.len(),
        root.sub_steps.len()
    );

    Ok(CompiledWorkflow {
        workflow,
        root,
        steps,
    })
}
