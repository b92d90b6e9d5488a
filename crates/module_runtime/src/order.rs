// Load Order - Where an admitted module goes in the table
//
// A module may name modules it has to precede. The position is pulled up to
// the earliest of those that is already loaded; otherwise the module is
// appended. Cycles among constraints are not detected: a module only ever
// moves earlier, so the last admitted module of a cycle wins.

use crate::ModuleRef;

/// Index at which `name` is inserted into `modules`
///
/// When `name` itself appears in `before`, only the names after it apply.
/// This lets several modules share one ordered list such as
/// `["a", "b", "c"]`: `b` must precede `c` but not `a`.
pub fn insertion_position<S: AsRef<str>>(modules: &[ModuleRef], name: &str, before: &[S]) -> usize {
    let applicable = match before.iter().position(|n| n.as_ref() == name) {
        Some(own) => &before[own + 1..],
        None => before,
    };

    applicable
        .iter()
        .filter_map(|target| {
            let position = modules.iter().position(|m| m.name() == target.as_ref())?;
            tracing::debug!("Module {} before {}:{}", name, target.as_ref(), position);
            Some(position)
        })
        .min()
        .unwrap_or(modules.len())
}
