//! Static ordering guarantees of node sequences, used to decide whether a path can be
//! evaluated without a final sort.

use crate::axis::Axis;
use crate::model::XdmNode;
use crate::step::Step;

/// Guarantees about a node sequence that is already in document order without
/// duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderProps {
    /// At most one node.
    pub single: bool,
    /// No node is an ancestor of another one.
    pub antichain: bool,
}

impl OrderProps {
    pub const SINGLE: OrderProps = OrderProps {
        single: true,
        antichain: true,
    };
    pub const SORTED: OrderProps = OrderProps {
        single: false,
        antichain: false,
    };

    /// Props after applying `step` to every node of a sequence with these props, or
    /// `None` if the result may be out of order or contain duplicates.
    pub fn then<N: XdmNode>(self, step: &Step<N>) -> Option<OrderProps> {
        let OrderProps {
            mut single,
            mut antichain,
        } = self;
        match step.axis {
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling => {
                return None;
            }
            Axis::Following => {
                if !single {
                    return None;
                }
                single = false;
                antichain = false;
            }
            Axis::FollowingSibling | Axis::Namespace => {
                if !single {
                    return None;
                }
                single = false;
                antichain = true;
            }
            Axis::Attribute => {
                single &= step.test.names_single_attribute();
                antichain = true;
            }
            Axis::Child => {
                if !antichain {
                    return None;
                }
                single = false;
            }
            Axis::Descendant | Axis::DescendantOrSelf => {
                if !antichain {
                    return None;
                }
                single = false;
                antichain = false;
            }
            Axis::Parent => {
                if !single {
                    return None;
                }
                antichain = true;
            }
            Axis::SelfAxis => {}
        }
        // one input node and at most one result per node
        if self.single && step.seq_type().occ.zero_or_one() {
            single = true;
            antichain = true;
        }
        Some(OrderProps { single, antichain })
    }

    /// Props of `root/steps...`, if every step keeps the guarantees.
    pub fn through<'s, N: XdmNode + 's>(
        self,
        steps: impl IntoIterator<Item = &'s Step<N>>,
    ) -> Option<OrderProps> {
        steps.into_iter().try_fold(self, OrderProps::then)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DbNode;
    use crate::test::Test;

    fn step(axis: Axis) -> Step<DbNode> {
        Step::simple(axis, Test::NODE)
    }

    #[test]
    fn reverse_axes_never_keep_order() {
        for axis in Axis::ALL.into_iter().filter(|a| a.is_reverse() && *a != Axis::Parent) {
            assert_eq!(OrderProps::SINGLE.then(&step(axis)), None, "{axis}");
        }
    }

    #[test]
    fn child_after_descendant_needs_sort() {
        let steps = [step(Axis::Descendant), step(Axis::Child)];
        assert_eq!(OrderProps::SINGLE.through(&steps), None);
    }

    #[test]
    fn child_chains_stay_sorted() {
        let steps = [step(Axis::Child), step(Axis::Child), step(Axis::Descendant)];
        assert_eq!(
            OrderProps::SINGLE.through(&steps),
            Some(OrderProps::SORTED)
        );
    }

    #[test]
    fn parent_of_single_stays_single() {
        let steps = [step(Axis::Parent), step(Axis::Parent), step(Axis::Child)];
        assert!(OrderProps::SINGLE.through(&steps).is_some());
        assert_eq!(OrderProps::SORTED.then(&step(Axis::Parent)), None);
    }
}
