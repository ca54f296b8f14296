    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = HostMetrics::new();
        assert_eq!(metrics.iterations.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.max_stack_depth.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_iteration() {
        let metrics = HostMetrics::new();
        metrics.record_iteration();
        metrics.record_iteration();
        assert_eq!(metrics.iterations.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_stack_depth_keeps_maximum() {
        let metrics = HostMetrics::new();
        metrics.record_stack_depth(3);
        metrics.record_stack_depth(8);
        metrics.record_stack_depth(2);
        assert_eq!(metrics.snapshot().max_stack_depth, 8);
    }

    #[test]
    fn test_snapshot() {
        let metrics = HostMetrics::new();
        metrics.record_job_scheduled();
        metrics.record_job_completed();
        metrics.record_hooks_run(4);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_scheduled, 1);
        assert_eq!(snapshot.jobs_completed, 1);
        assert_eq!(snapshot.hooks_run, 4);
    }

    #[test]
    fn test_cancel_ratio() {
        let metrics = HostMetrics::new();
        assert_eq!(metrics.snapshot().cancel_ratio(), 0.0);

        metrics.record_job_completed();
        metrics.record_job_completed();
        metrics.record_job_cancelled();
        metrics.record_job_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_finished(), 4);
        assert_eq!(snapshot.cancel_ratio(), 0.25);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = HostMetrics::new();
        metrics.record_handle_closed();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["handles_closed"], 1);
        assert!(json["timestamp"].is_string());
    }
