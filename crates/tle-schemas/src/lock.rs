/// Lock acquisition kind: a profit-locking acquisition gets a longer timeout
/// than a routine one (see `Config::lock_timeout_ms_profit_locking`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LockKind {
    Normal,
    ProfitLocking,
}
