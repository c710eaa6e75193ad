//! Catalog of known GC pause and phase kinds.

use serde::Serialize;

/// How an event relates to application stop-the-world time.
///
/// `Pause` events stop the application for their whole duration. `Partial`
/// events are cycles that contain both pause and concurrent phases; their
/// STW contribution is the sum of their pause phases. `Concurrent` events
/// run alongside the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseKind {
    Pause,
    Partial,
    Concurrent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum GCEventType {
    // Top-level collections
    YoungGC,
    FullGC,
    G1YoungMixedGC,
    G1ConcurrentCycle,
    CMSConcurrentMarkSwept,
    ZGarbageCollection,
    ZAllocationStall,
    OutOfMemory,
    Safepoint,

    // G1 young/full pause phases
    PreEvacuateCollectionSet,
    EvacuateCollectionSet,
    PostEvacuateCollectionSet,
    OtherPhase,
    ReferenceProcessing,
    CodeRootScanning,

    // G1 concurrent cycle phases
    G1ConcurrentClearClaimedMarks,
    G1ConcurrentScanRootRegions,
    G1ConcurrentMark,
    G1ConcurrentRebuildRememberedSets,
    G1ConcurrentCleanupForNextMark,
    G1ConcurrentCreateLiveData,
    G1Remark,
    G1Cleanup,

    // CMS cycle phases
    CMSInitialMark,
    CMSConcurrentMark,
    CMSConcurrentPreclean,
    CMSConcurrentAbortablePreclean,
    CMSFinalRemark,
    CMSConcurrentSweep,
    CMSConcurrentReset,
    Rescan,
    WeakRefsProcessing,
    ClassUnloading,
    ScrubSymbolTable,
    ScrubStringTable,

    // Serial full GC phases
    MarkLiveObjects,
    ComputeNewObjectAddresses,
    AdjustPointers,
    MoveObjects,

    // Parallel full GC phases
    MarkingPhase,
    SummaryPhase,
    AdjustRoots,
    CompactionPhase,
    PostCompact,

    // ZGC cycle phases
    ZPauseMarkStart,
    ZConcurrentMark,
    ZPauseMarkEnd,
    ZConcurrentNonstrongReferences,
    ZConcurrentResetRelocationSet,
    ZConcurrentDestroyDetachedPages,
    ZConcurrentSelectRelocationSet,
    ZConcurrentPrepareRelocationSet,
    ZPauseRelocateStart,
    ZConcurrentRelocate,
}

impl GCEventType {
    pub fn name(&self) -> &'static str {
        use GCEventType::*;
        match self {
            YoungGC => "Young GC",
            FullGC => "Full GC",
            G1YoungMixedGC => "Mixed GC",
            G1ConcurrentCycle => "Concurrent Cycle",
            CMSConcurrentMarkSwept => "CMS",
            ZGarbageCollection => "Garbage Collection",
            ZAllocationStall => "Allocation Stall",
            OutOfMemory => "Out Of Memory",
            Safepoint => "Safepoint",
            PreEvacuateCollectionSet => "Pre Evacuate Collection Set",
            EvacuateCollectionSet => "Evacuate Collection Set",
            PostEvacuateCollectionSet => "Post Evacuate Collection Set",
            OtherPhase => "Other",
            ReferenceProcessing => "Reference Processing",
            CodeRootScanning => "Code Root Scanning",
            G1ConcurrentClearClaimedMarks => "Concurrent Clear Claimed Marks",
            G1ConcurrentScanRootRegions => "Concurrent Scan Root Regions",
            G1ConcurrentMark => "Concurrent Mark",
            G1ConcurrentRebuildRememberedSets => "Concurrent Rebuild Remembered Sets",
            G1ConcurrentCleanupForNextMark => "Concurrent Cleanup for Next Mark",
            G1ConcurrentCreateLiveData => "Concurrent Create Live Data",
            G1Remark => "Remark",
            G1Cleanup => "Cleanup",
            CMSInitialMark => "Initial Mark",
            CMSConcurrentMark => "Concurrent Mark",
            CMSConcurrentPreclean => "Concurrent Preclean",
            CMSConcurrentAbortablePreclean => "Concurrent Abortable Preclean",
            CMSFinalRemark => "Final Remark",
            CMSConcurrentSweep => "Concurrent Sweep",
            CMSConcurrentReset => "Concurrent Reset",
            Rescan => "Rescan",
            WeakRefsProcessing => "Weak Refs Processing",
            ClassUnloading => "Class Unloading",
            ScrubSymbolTable => "Scrub Symbol Table",
            ScrubStringTable => "Scrub String Table",
            MarkLiveObjects => "Mark Live Objects",
            ComputeNewObjectAddresses => "Compute New Object Addresses",
            AdjustPointers => "Adjust Pointers",
            MoveObjects => "Move Objects",
            MarkingPhase => "Marking Phase",
            SummaryPhase => "Summary Phase",
            AdjustRoots => "Adjust Roots",
            CompactionPhase => "Compaction Phase",
            PostCompact => "Post Compact",
            ZPauseMarkStart => "Pause Mark Start",
            ZConcurrentMark => "Concurrent Mark",
            ZPauseMarkEnd => "Pause Mark End",
            ZConcurrentNonstrongReferences => "Concurrent Process Non-Strong References",
            ZConcurrentResetRelocationSet => "Concurrent Reset Relocation Set",
            ZConcurrentDestroyDetachedPages => "Concurrent Destroy Detached Pages",
            ZConcurrentSelectRelocationSet => "Concurrent Select Relocation Set",
            ZConcurrentPrepareRelocationSet => "Concurrent Prepare Relocation Set",
            ZPauseRelocateStart => "Pause Relocate Start",
            ZConcurrentRelocate => "Concurrent Relocate",
        }
    }

    pub fn pause_kind(&self) -> PauseKind {
        use GCEventType::*;
        match self {
            YoungGC | FullGC | G1YoungMixedGC | Safepoint => PauseKind::Pause,
            G1ConcurrentCycle | CMSConcurrentMarkSwept | ZGarbageCollection => PauseKind::Partial,
            ZAllocationStall | OutOfMemory => PauseKind::Concurrent,
            PreEvacuateCollectionSet | EvacuateCollectionSet | PostEvacuateCollectionSet
            | OtherPhase | ReferenceProcessing | CodeRootScanning => PauseKind::Pause,
            G1Remark | G1Cleanup => PauseKind::Pause,
            G1ConcurrentClearClaimedMarks
            | G1ConcurrentScanRootRegions
            | G1ConcurrentMark
            | G1ConcurrentRebuildRememberedSets
            | G1ConcurrentCleanupForNextMark
            | G1ConcurrentCreateLiveData => PauseKind::Concurrent,
            CMSInitialMark | CMSFinalRemark | Rescan | WeakRefsProcessing | ClassUnloading
            | ScrubSymbolTable | ScrubStringTable => PauseKind::Pause,
            CMSConcurrentMark | CMSConcurrentPreclean | CMSConcurrentAbortablePreclean
            | CMSConcurrentSweep | CMSConcurrentReset => PauseKind::Concurrent,
            MarkLiveObjects | ComputeNewObjectAddresses | AdjustPointers | MoveObjects
            | MarkingPhase | SummaryPhase | AdjustRoots | CompactionPhase | PostCompact => {
                PauseKind::Pause
            }
            ZPauseMarkStart | ZPauseMarkEnd | ZPauseRelocateStart => PauseKind::Pause,
            ZConcurrentMark
            | ZConcurrentNonstrongReferences
            | ZConcurrentResetRelocationSet
            | ZConcurrentDestroyDetachedPages
            | ZConcurrentSelectRelocationSet
            | ZConcurrentPrepareRelocationSet
            | ZConcurrentRelocate => PauseKind::Concurrent,
        }
    }

    pub fn is_young_gc(&self) -> bool {
        matches!(self, GCEventType::YoungGC | GCEventType::G1YoungMixedGC)
    }

    pub fn is_full_gc(&self) -> bool {
        matches!(self, GCEventType::FullGC)
    }

    /// Old-generation cycles (CMS mark-sweep, G1 concurrent cycle).
    pub fn is_old_gc(&self) -> bool {
        matches!(
            self,
            GCEventType::CMSConcurrentMarkSwept | GCEventType::G1ConcurrentCycle
        )
    }

    /// Key used for interval bookkeeping: all young-GC variants count as one
    /// logical stream of young collections.
    pub fn interval_key(&self) -> GCEventType {
        if self.is_young_gc() {
            GCEventType::YoungGC
        } else {
            *self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(GCEventType::YoungGC.is_young_gc());
        assert!(GCEventType::G1YoungMixedGC.is_young_gc());
        assert!(!GCEventType::FullGC.is_young_gc());
        assert!(GCEventType::CMSConcurrentMarkSwept.is_old_gc());
        assert_eq!(
            GCEventType::G1YoungMixedGC.interval_key(),
            GCEventType::YoungGC
        );
        assert_eq!(GCEventType::FullGC.interval_key(), GCEventType::FullGC);
    }

    #[test]
    fn pause_kinds() {
        assert_eq!(GCEventType::YoungGC.pause_kind(), PauseKind::Pause);
        assert_eq!(
            GCEventType::ZGarbageCollection.pause_kind(),
            PauseKind::Partial
        );
        assert_eq!(
            GCEventType::CMSConcurrentSweep.pause_kind(),
            PauseKind::Concurrent
        );
        assert_eq!(GCEventType::G1Remark.pause_kind(), PauseKind::Pause);
    }
}
