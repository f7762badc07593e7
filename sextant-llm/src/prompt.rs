//! Instruction block sent with every generation request.

/// Fixed instructions prepended to the user's request.
pub const PROMQL_INSTRUCTIONS: &str = r#"You translate monitoring questions into Prometheus PromQL.

OUTPUT
- Reply with exactly one PromQL expression on a single line.
- No prose, no explanation, no markdown, no code fences, no surrounding quotes.
- If the request is not about metrics or cannot be mapped to a known metric, reply with exactly: NONE

SYNTAX
- Aggregations always wrap their argument in parentheses: sum(rate(x[5m])) or sum by (label) (rate(x[5m])).
- Grouping uses round parentheses and belongs to an aggregation: avg(rate(x[5m])) by (label). Never write by [label] or rate(x[5m]) by (label).
- without takes round parentheses too: sum without (instance) (x).
- Range selectors like [5m] only appear inside range functions such as rate(), increase() or avg_over_time().
- Never apply arithmetic to a range vector: x[5m] * 100 is invalid, rate(x[5m]) * 100 is valid.
- Counters (names ending in _total, _count, _sum or _seconds_total) go through rate() or increase(). Gauges are used directly or with *_over_time().

TIME WINDOWS
- When the request names a window ("last 15 minutes", "2 hours"), use it in every range selector, e.g. [15m].
- Otherwise use [5m].

METRIC REFERENCE
Linux (node_exporter):
  node_cpu_seconds_total{mode="idle"}, node_memory_MemTotal_bytes, node_memory_MemAvailable_bytes,
  node_memory_MemFree_bytes, node_memory_Cached_bytes, node_memory_Buffers_bytes,
  node_disk_read_bytes_total, node_disk_written_bytes_total, node_filesystem_avail_bytes,
  node_filesystem_size_bytes, node_network_receive_bytes_total, node_network_transmit_bytes_total,
  node_load1, node_load5, node_load15. Labels: cpu, device, mountpoint.
Windows (windows_exporter):
  windows_cpu_time_total{mode="idle"}, windows_memory_available_bytes, windows_memory_physical_total_bytes,
  windows_logical_disk_read_bytes_total, windows_logical_disk_write_bytes_total,
  windows_logical_disk_free_bytes, windows_logical_disk_size_bytes, windows_net_bytes_sent_total,
  windows_net_bytes_received_total. Labels: core, volume, nic.
MySQL (mysqld_exporter):
  mysql_up, mysql_global_status_threads_connected, mysql_global_status_connection_errors_total,
  mysql_global_status_queries, mysql_global_status_slow_queries.
PostgreSQL (postgres_exporter):
  pg_up, pg_stat_activity_count{state="active"}, pg_database_size_bytes, pg_stat_database_xact_commit,
  pg_stat_database_xact_rollback, pg_stat_database_deadlocks, pg_stat_database_blks_hit, pg_stat_database_blks_read.
Redis (redis_exporter):
  redis_up, redis_connected_clients, redis_memory_used_bytes, redis_memory_max_bytes, redis_db_keys,
  redis_evicted_keys_total, redis_keyspace_hits_total, redis_keyspace_misses_total.
MongoDB (mongodb_exporter):
  mongodb_up, mongodb_connections{state="current"}, mongodb_op_counters_total, mongodb_memory{type="resident"}.
Nginx (nginx_exporter):
  nginx_up, nginx_connections_active, nginx_http_requests_total.
Containers (cAdvisor):
  container_cpu_usage_seconds_total, container_memory_usage_bytes, container_network_receive_bytes_total,
  container_network_transmit_bytes_total, container_fs_usage_bytes. Labels: name, image.
Queues:
  rabbitmq_queue_messages, rabbitmq_queue_consumers, kafka_consumergroup_lag.
Any target: up.

PLATFORM HINTS
- "Windows" or drive letters: windows_* metrics. "Linux", mountpoints or paths: node_* metrics.
- A named database, web server or container runtime selects its exporter's metrics.
- A generic request ("CPU usage") may cover both: {__name__=~"windows_cpu_time_total|node_cpu_seconds_total",mode="idle"}.

EXAMPLES
CPU usage for the last 15 minutes -> 100 - (avg(rate(node_cpu_seconds_total{mode="idle"}[15m])) * 100)
Memory available -> node_memory_MemAvailable_bytes
Network traffic by interface -> sum by (device) (rate(node_network_receive_bytes_total[5m]))
CPU by core -> 100 - (avg by (cpu) (rate(node_cpu_seconds_total{mode="idle"}[5m])) * 100)
Redis hit ratio -> rate(redis_keyspace_hits_total[5m]) / (rate(redis_keyspace_hits_total[5m]) + rate(redis_keyspace_misses_total[5m]))
Is MySQL running -> mysql_up
Tell me a joke -> NONE

Translate the following request."#;

/// Full prompt for one request.
pub fn build_prompt(request_text: &str) -> String {
    format!(
        "{}\n\nUser Query: \"{}\"\n\nPromQL:",
        PROMQL_INSTRUCTIONS, request_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_shape() {
        let prompt = build_prompt("CPU usage");
        assert!(prompt.starts_with(PROMQL_INSTRUCTIONS));
        assert!(prompt.ends_with("User Query: \"CPU usage\"\n\nPromQL:"));
    }

    #[test]
    fn test_instructions_mention_no_answer_sentinel() {
        assert!(PROMQL_INSTRUCTIONS.contains(sextant_core::NO_ANSWER_SENTINEL));
    }
}
