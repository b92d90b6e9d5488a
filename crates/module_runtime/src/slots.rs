// Category Slot Counter
//
// Gives every module of a category a slot in that category's config array and
// returns the array length. The length also covers every slot the previous
// generation used, so config carried over from it always fits.

use module_types::{CycleError, CycleResult, ModuleCategory};

use crate::{Cycle, index};

/// Assign missing slots of `category` and return the array length it needs
///
/// Seals the category: no module of it can be admitted afterwards. Two
/// modules carrying the same slot fail the count.
pub fn count_and_assign(
    cycle: &mut Cycle,
    previous: Option<&Cycle>,
    category: ModuleCategory,
) -> CycleResult<usize> {
    let mut next = 0;
    let mut max = 0;

    for (position, module) in cycle.modules_of(category).enumerate() {
        if let Some(slot) = module.category_slot() {
            if let Some(holder) = cycle
                .modules_of(category)
                .take(position)
                .find(|m| m.category_slot() == Some(slot))
            {
                tracing::warn!("{} module {} carries slot {} of {}", category, module.name(), slot, holder.name());
                return Err(CycleError::SlotInUse {
                    module: module.name().to_string(),
                    holder: holder.name().to_string(),
                    category,
                    slot,
                });
            }
            max = max.max(slot);
            if slot == next {
                next += 1;
            }
            continue;
        }

        let in_use = cycle
            .modules_of(category)
            .chain(previous.into_iter().flat_map(|p| p.modules_of(category)))
            .filter_map(|m| m.category_slot());
        let slot = module.assign_category_slot(index::lowest_unused(in_use, next));

        tracing::debug!("{} module {} -> slot {}", category, module.name(), slot);
        max = max.max(slot);
        next = slot + 1;
    }

    if let Some(previous) = previous {
        let scan = index::scan(previous.modules_of(category).filter_map(|m| m.category_slot()), 0);
        if let Some(previous_max) = scan.max_assigned {
            max = max.max(previous_max);
        }
    }

    let count = max + 1;
    cycle.sealed.insert(category);
    cycle.slot_counts.insert(category, count);

    tracing::debug!("{} modules sealed with {} slots", category, count);
    Ok(count)
}
