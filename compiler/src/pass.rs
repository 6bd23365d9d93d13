// pass.rs — Pass descriptors, dependency resolution, stage certificates
//
// Declares the eight preparation passes (loading is outside the runner),
// their dependency edges, and what each leaves behind. The pipeline uses
// `required_passes` to run the prefix a stop point needs.

use std::collections::HashSet;

// ── Pass and artifact identifiers ──────────────────────────────────────────

/// One preparation pass, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassId {
    ResolveTypes,
    PruneInlets,
    RemapSendReceive,
    Reduce,
    CascadeExpansion,
    FmaFusion,
    GroupReceivers,
    AssignBuffers,
}

/// What a pass establishes on the patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    ConcreteKinds,
    LiveInlets,
    VariableRoutes,
    CanonicalNodes,
    BinaryFanIn,
    FusedArithmetic,
    MergedReceivers,
    Schedule,
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a pass.
pub struct PassDescriptor {
    /// Name used in verbose timing lines.
    pub name: &'static str,
    /// Passes whose results this pass consumes.
    pub inputs: &'static [PassId],
    pub outputs: &'static [ArtifactId],
    /// Postconditions, for documentation and verbose output.
    pub invariants: &'static str,
}

pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::ResolveTypes => PassDescriptor {
            name: "resolve_types",
            inputs: &[],
            outputs: &[ArtifactId::ConcreteKinds],
            invariants: "no reachable mixed connection",
        },
        PassId::PruneInlets => PassDescriptor {
            name: "prune_inlets",
            inputs: &[PassId::ResolveTypes],
            outputs: &[ArtifactId::LiveInlets],
            invariants: "unconnected graph inlets feed nothing",
        },
        PassId::RemapSendReceive => PassDescriptor {
            name: "remap_send_receive",
            inputs: &[PassId::PruneInlets],
            outputs: &[ArtifactId::VariableRoutes],
            invariants: "no high-level signal send or receive",
        },
        PassId::Reduce => PassDescriptor {
            name: "reduce",
            inputs: &[PassId::RemapSendReceive],
            outputs: &[ArtifactId::CanonicalNodes],
            invariants: "only canonical nodes and graphs remain",
        },
        PassId::CascadeExpansion => PassDescriptor {
            name: "cascade_expansion",
            inputs: &[PassId::Reduce],
            outputs: &[ArtifactId::BinaryFanIn],
            invariants: "at most one signal source per inlet",
        },
        PassId::FmaFusion => PassDescriptor {
            name: "fma_fusion",
            inputs: &[PassId::CascadeExpansion],
            outputs: &[ArtifactId::FusedArithmetic],
            invariants: "single-use multiplies into adds are fused",
        },
        PassId::GroupReceivers => PassDescriptor {
            name: "group_receivers",
            inputs: &[PassId::Reduce],
            outputs: &[ArtifactId::MergedReceivers],
            invariants: "one control receiver per root-scope name",
        },
        PassId::AssignBuffers => PassDescriptor {
            name: "assign_buffers",
            inputs: &[PassId::FmaFusion, PassId::GroupReceivers],
            outputs: &[ArtifactId::Schedule],
            invariants: "every graph ordered, every signal outlet buffered",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

pub const ALL_PASSES: [PassId; 8] = [
    PassId::ResolveTypes,
    PassId::PruneInlets,
    PassId::RemapSendReceive,
    PassId::Reduce,
    PassId::CascadeExpansion,
    PassId::FmaFusion,
    PassId::GroupReceivers,
    PassId::AssignBuffers,
];

/// The passes needed to reach `terminal`, in execution order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order.sort();
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Certificates ───────────────────────────────────────────────────────────

/// Machine-checkable evidence that a stage met its postconditions.
pub trait StageCert {
    fn obligations(&self) -> Vec<(&'static str, bool)>;

    fn all_pass(&self) -> bool {
        self.obligations().iter().all(|(_, ok)| *ok)
    }

    /// Names of the obligations that did not hold.
    fn failed(&self) -> Vec<&'static str> {
        self.obligations()
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_preparation_runs_every_pass_in_order() {
        assert_eq!(required_passes(PassId::AssignBuffers), ALL_PASSES.to_vec());
    }

    #[test]
    fn grouping_does_not_need_fusion() {
        let passes = required_passes(PassId::GroupReceivers);
        assert_eq!(
            passes,
            vec![
                PassId::ResolveTypes,
                PassId::PruneInlets,
                PassId::RemapSendReceive,
                PassId::Reduce,
                PassId::GroupReceivers,
            ]
        );
        assert!(!passes.contains(&PassId::FmaFusion));
    }

    #[test]
    fn first_pass_is_minimal() {
        assert_eq!(required_passes(PassId::ResolveTypes), vec![PassId::ResolveTypes]);
    }

    #[test]
    fn dependencies_precede_dependents() {
        for pass in ALL_PASSES {
            let order = required_passes(pass);
            let me = order.iter().position(|&p| p == pass).unwrap();
            for dep in descriptor(pass).inputs {
                let at = order.iter().position(|p| p == dep).unwrap();
                assert!(at < me, "{pass:?} depends on {dep:?}");
            }
        }
    }

    #[test]
    fn every_pass_declares_outputs_and_a_unique_name() {
        let names: HashSet<_> = ALL_PASSES.iter().map(|&p| descriptor(p).name).collect();
        assert_eq!(names.len(), ALL_PASSES.len());
        for pass in ALL_PASSES {
            assert!(!descriptor(pass).outputs.is_empty(), "{pass:?}");
        }
    }

    struct Two(bool, bool);

    impl StageCert for Two {
        fn obligations(&self) -> Vec<(&'static str, bool)> {
            vec![("first", self.0), ("second", self.1)]
        }
    }

    #[test]
    fn certificates_report_failed_obligations() {
        assert!(Two(true, true).all_pass());
        let cert = Two(true, false);
        assert!(!cert.all_pass());
        assert_eq!(cert.failed(), ["second"]);
    }
}
