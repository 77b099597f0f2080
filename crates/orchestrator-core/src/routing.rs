//! Static classification oracle: block category and connection-skip rules.

use crate::model::workflow::{parse_condition_handle, BlockCategory, BlockType, HANDLE_LOOP_END, HANDLE_LOOP_START, HANDLE_PARALLEL_END, HANDLE_PARALLEL_START};

pub fn category(block_type: &BlockType) -> BlockCategory {
    block_type.category()
}

pub fn requires_active_path_check(block_type: &BlockType) -> bool {
    matches!(category(block_type), BlockCategory::FlowControl)
}

pub fn should_skip_in_selective_activation(block_type: &BlockType) -> bool {
    !matches!(category(block_type), BlockCategory::Regular)
}

/// Whether executing this block type should trigger generic selective
/// downstream activation, as opposed to the block choosing its own targets
/// (routing) or deferring to a manager (flow-control).
pub fn should_activate_downstream(block_type: &BlockType) -> bool {
    matches!(category(block_type), BlockCategory::Regular)
}

/// True when a connection's handle must never be followed during selective
/// activation: internal flow-control plumbing, or a condition branch that
/// only activates when its owning condition block actually selects it.
pub fn should_skip_connection(source_handle: &str, _target_type: &BlockType) -> bool {
    matches!(
        source_handle,
        HANDLE_PARALLEL_START | HANDLE_PARALLEL_END | HANDLE_LOOP_START | HANDLE_LOOP_END
    ) || parse_condition_handle(source_handle).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_types_activate_downstream_directly() {
        for t in [
            BlockType::Starter,
            BlockType::Custom("function".into()),
            BlockType::Custom("api".into()),
            BlockType::Custom("agent".into()),
            BlockType::Custom("response".into()),
            BlockType::Custom("evaluator".into()),
        ] {
            assert_eq!(category(&t), BlockCategory::Regular);
            assert!(!requires_active_path_check(&t));
            assert!(!should_skip_in_selective_activation(&t));
            assert!(should_activate_downstream(&t));
        }
    }

    #[test]
    fn routing_types_choose_their_own_targets() {
        for t in [BlockType::Router, BlockType::Condition] {
            assert_eq!(category(&t), BlockCategory::Routing);
            assert!(should_skip_in_selective_activation(&t));
            assert!(!should_activate_downstream(&t));
        }
    }

    #[test]
    fn flow_control_types_require_active_path_check() {
        for t in [BlockType::Loop, BlockType::Parallel, BlockType::Workflow] {
            assert_eq!(category(&t), BlockCategory::FlowControl);
            assert!(requires_active_path_check(&t));
            assert!(should_skip_in_selective_activation(&t));
            assert!(!should_activate_downstream(&t));
        }
    }

    #[test]
    fn skips_internal_flow_control_handles() {
        let regular = BlockType::Custom("function".into());
        assert!(should_skip_connection(HANDLE_PARALLEL_START, &regular));
        assert!(should_skip_connection(HANDLE_PARALLEL_END, &regular));
        assert!(should_skip_connection(HANDLE_LOOP_START, &regular));
        assert!(should_skip_connection(HANDLE_LOOP_END, &regular));
    }

    #[test]
    fn skips_condition_branch_handles() {
        let regular = BlockType::Custom("function".into());
        assert!(should_skip_connection("condition-abc", &regular));
    }

    #[test]
    fn does_not_skip_plain_handles() {
        let regular = BlockType::Custom("function".into());
        assert!(!should_skip_connection("source", &regular));
        assert!(!should_skip_connection("error", &regular));
        assert!(!should_skip_connection("", &regular));
    }
}
