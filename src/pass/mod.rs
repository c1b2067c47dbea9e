//! The rewrite pass engine.
//!
//! Passes implement `GraphPass` and run under a `PassManager` in a fixed
//! order assembled by `optimize`. Later passes may assume the invariants
//! established by earlier ones; `LintPass` re-checks the structural
//! invariants after every stage and any lint failure aborts the export.

pub mod canonicalize;
pub mod const_prop;
pub mod dce;
pub mod erase_scalars;
pub mod fixup_loops;
pub mod inline_fork;
pub mod legalize_div;
pub mod lint;
pub mod lower_tuples;
pub mod peephole;
pub mod remove_inplace;
pub mod split_lists;

pub use canonicalize::{CanonicalizeOpsPass, CanonicalizePass};
pub use const_prop::ConstPropPass;
pub use dce::DcePass;
pub use erase_scalars::EraseScalarsPass;
pub use fixup_loops::FixupLoopsPass;
pub use inline_fork::InlineForkWaitPass;
pub use legalize_div::LegalizeDivPass;
pub use lint::LintPass;
pub use lower_tuples::LowerTuplesPass;
pub use peephole::PeepholePass;
pub use remove_inplace::RemoveInplacePass;
pub use split_lists::SplitListConstantsPass;

use crate::error::{Error, PassError};
use crate::export::{ExportOptions, OperatorExportType};
use crate::ir::{Graph, ParamMap};
use crate::translate;

/// A pass that transforms a `Graph` in place.
///
/// Passes must be deterministic: given the same graph, the transformed
/// output must be identical across runs (no global mutable state, no
/// randomness).
pub trait GraphPass {
    /// Human-readable name, used in error messages and diagnostics.
    fn name(&self) -> &'static str;

    /// Run the pass on the graph.
    ///
    /// On success, the graph is in a valid state for the next pass.
    /// On error, the graph state is unspecified — the pipeline aborts.
    fn run(&mut self, graph: &mut Graph) -> Result<(), Error>;
}

/// Manages and executes an ordered sequence of graph passes.
pub struct PassManager {
    passes: Vec<Box<dyn GraphPass>>,
    /// If set, dumps the graph to stderr after the pass with this name.
    dump_after: Option<String>,
}

impl PassManager {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            dump_after: None,
        }
    }

    /// Appends a pass to the end of the pipeline.
    pub fn add_pass(&mut self, pass: impl GraphPass + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// Configures the manager to dump the graph to stderr after the named
    /// pass completes.
    pub fn set_dump_after(&mut self, pass_name: impl Into<String>) {
        self.dump_after = Some(pass_name.into());
    }

    /// Runs all passes in registration order on `graph`.
    ///
    /// Returns `Err((pass_name, error))` at the first failure.
    pub fn run(&mut self, graph: &mut Graph) -> Result<(), (String, Error)> {
        for pass in &mut self.passes {
            log::debug!("running pass '{}'", pass.name());
            pass.run(graph).map_err(|e| (pass.name().to_owned(), e))?;
            if let Some(ref target) = self.dump_after {
                if pass.name() == target.as_str() {
                    eprintln!("--- graph after {} ---\n{}", pass.name(), graph);
                }
            }
        }
        Ok(())
    }

    /// Returns the names of all registered passes in pipeline order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalizes a freshly captured graph and (unless exporting the raw form)
/// rewrites every node into the target-format vocabulary.
///
/// The order is load-bearing: each stage may assume the invariants
/// established by the stages before it, and lint runs between stages so a
/// malformed capture fails fast instead of miscompiling.
///
/// Translation builds a new graph, so the identity-keyed parameter table is
/// re-keyed through the translation environment in the same step.
pub fn optimize(
    graph: &mut Graph,
    params: &mut ParamMap,
    options: &ExportOptions,
) -> Result<(), Error> {
    let mut pm = PassManager::new();

    pm.add_pass(InlineForkWaitPass);
    pm.add_pass(DcePass);
    pm.add_pass(LintPass);

    pm.add_pass(RemoveInplacePass);
    // The tracer records shape constructors and the like as real ops; fold
    // what is already literal so more of the graph is foldable downstream.
    pm.add_pass(ConstPropPass);
    pm.add_pass(SplitListConstantsPass);
    pm.add_pass(DcePass);
    pm.add_pass(LintPass);

    pm.add_pass(CanonicalizeOpsPass);
    pm.add_pass(LintPass);

    pm.add_pass(PeepholePass::generic());
    pm.add_pass(LintPass);

    // The target format's division promotes differently than the source;
    // make operand types explicitly floating-point first.
    pm.add_pass(LegalizeDivPass);
    // The target format has no scalar number types and no tuples.
    pm.add_pass(EraseScalarsPass);
    pm.add_pass(LowerTuplesPass);
    pm.add_pass(PeepholePass::generic());
    pm.add_pass(LintPass);

    run(pm, graph, options)?;

    if options.operator_export_type != OperatorExportType::Raw {
        let (translated, env) =
            translate::translate_graph(graph, options.operator_export_type)?;
        *graph = translated;
        remap_params(params, &env)?;

        let mut pm = PassManager::new();
        pm.add_pass(LintPass);
        pm.add_pass(PeepholePass::target());
        pm.add_pass(LintPass);
        run(pm, graph, options)?;
    }

    let mut pm = PassManager::new();
    pm.add_pass(DcePass);
    pm.add_pass(LintPass);
    pm.add_pass(FixupLoopsPass);
    pm.add_pass(LintPass);
    pm.add_pass(CanonicalizePass);
    pm.add_pass(LintPass);
    run(pm, graph, options)
}

/// Dead-code sweep after constant folding, so folded nodes (left without
/// inputs or uses by design) never reach the serializer.
pub fn run_post_fold_cleanup(graph: &mut Graph) -> Result<(), Error> {
    let mut pm = PassManager::new();
    pm.add_pass(DcePass);
    pm.add_pass(LintPass);
    pm.run(graph).map_err(|(name, e)| {
        log::error!("pass '{}' failed: {}", name, e);
        e
    })
}

fn run(mut pm: PassManager, graph: &mut Graph, options: &ExportOptions) -> Result<(), Error> {
    if options.verbose {
        pm.set_dump_after("canonicalize");
    }
    pm.run(graph).map_err(|(name, e)| {
        log::error!("pass '{}' failed: {}", name, e);
        e
    })
}

/// Re-keys the parameter table through the source→destination value map
/// produced by translation.
fn remap_params(
    params: &mut ParamMap,
    env: &translate::TranslationEnv,
) -> Result<(), Error> {
    let old = std::mem::take(params);
    for (value, tensor) in old {
        let mapped = env.get(&value).copied().ok_or_else(|| PassError::Internal {
            pass: "translate",
            detail: format!("parameter value {} was not carried into the translated graph", value),
        })?;
        params.insert(mapped, tensor);
    }
    Ok(())
}
