//! Instance lifestyles.
//!
//! A lifestyle decides whether an activation constructs fresh or reuses a
//! stored instance. The four core lifestyles interpose a double-checked
//! load on their storage location:
//!
//! - [`Lifestyle::Transient`] constructs on every call.
//! - [`Lifestyle::Singleton`] keeps one instance per root scope.
//! - [`Lifestyle::PerScope`] keeps one instance per scope id.
//! - [`Lifestyle::PerContext`] keeps one instance per top-level locate call.

use std::any::TypeId;

use crate::strategy::ActivationDelegate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifestyle {
    #[default]
    Transient,
    Singleton,
    PerScope,
    PerContext,
}

impl std::fmt::Display for Lifestyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Lifestyle::Transient => "transient",
            Lifestyle::Singleton => "singleton",
            Lifestyle::PerScope => "per-scope",
            Lifestyle::PerContext => "per-context",
        };
        f.write_str(name)
    }
}

/// Wrap an assembled activation with its lifestyle accessor.
///
/// Storage cells are keyed by `(strategy id, closed type id)` so a dynamic
/// request that bypassed the delegate cache still lands on the same cell,
/// and one open-generic strategy keeps distinct cells per closed
/// instantiation. Singleton construction anchors disposables to the root's
/// disposal scope, per-scope construction to the resolving scope's.
pub(crate) fn apply(
    lifestyle: Lifestyle,
    strategy_id: u64,
    target_type: TypeId,
    inner: ActivationDelegate,
) -> ActivationDelegate {
    let slot = (strategy_id, target_type);
    match lifestyle {
        Lifestyle::Transient => inner,
        Lifestyle::Singleton => std::sync::Arc::new(move |scope, _disposal, ctx| {
            let root = scope.root_scope();
            let cell = root.lifestyle_cell(slot);
            cell.get_or_try_init(|| inner(scope, root.disposal_scope(), ctx))
                .cloned()
        }),
        Lifestyle::PerScope => std::sync::Arc::new(move |scope, _disposal, ctx| {
            let cell = scope.lifestyle_cell(slot);
            cell.get_or_try_init(|| inner(scope, scope.disposal_scope(), ctx))
                .cloned()
        }),
        Lifestyle::PerContext => std::sync::Arc::new(move |scope, disposal, ctx| {
            if let Some(existing) = ctx.slot_get(slot) {
                return Ok(existing);
            }
            let instance = inner(scope, disposal, ctx)?;
            ctx.slot_insert(slot, instance.clone());
            Ok(instance)
        }),
    }
}
