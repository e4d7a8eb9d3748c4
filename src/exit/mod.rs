// =============================================================================
// Exit Management Module
// =============================================================================
//
// `worker` runs the periodic sweep over open options positions, evaluating
// each through `Orchestrator::orchestrate_exit` (PROFIT_TARGET/STOP_LOSS/
// GEX_FLIP/TIME_EXIT priority order lives there, not here).

pub mod worker;
