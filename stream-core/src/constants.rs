use std::time::Duration;

/// Максимум записей в одном put-batch
pub const MAX_PUT_RECORDS: usize = 500;

/// Максимум записей в одном get-records
pub const MAX_GET_RECORDS: usize = 10_000;

/// Код ошибки, которым сервис помечает запись, отбитую лимитом шарда
pub const THROTTLED_ERROR_CODE: &str = "ProvisionedThroughputExceeded";

/// Шаг, с которым длинные паузы проверяют флаг shutdown
pub const SHUTDOWN_POLL_TICK: Duration = Duration::from_millis(200);
