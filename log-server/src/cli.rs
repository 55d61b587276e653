use clap::Parser;
use std::net::SocketAddr;

use crate::config::{self, StreamSpec};

/// Log Server - шардированный лог в памяти, доступный producer и consumer по TCP.
///
/// На каждый TCP-фрейм запроса один фрейм ответа. Данные живут до остановки процесса.
#[derive(Parser, Debug, Clone)]
#[command(name = "log-server", version, about)]
pub(crate) struct Args {
    /// TCP bind address, например 127.0.0.1:4567
    #[arg(long, env = "LOG_SERVER_ADDR", default_value = config::BIND_ADDR)]
    pub(crate) bind: SocketAddr,

    /// Стрим, создаваемый при старте: NAME или NAME:SHARDS. Можно повторять
    #[arg(long = "stream")]
    pub(crate) streams: Vec<StreamSpec>,

    /// Сколько записей шард принимает за один put_records;
    /// остальные отбиваются как при троттлинге
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub(crate) shard_write_limit: Option<u64>,
}
