//! RPC Method Handlers
//!
//! Thin translation between JSON-RPC parameters and the job service.

use crate::error::{busy, throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    AddTopicsRequest, DeleteResponse, ExecutionListResponse, JobIdRequest, JobListResponse,
    ListExecutionsRequest, SiteRequest, StatsResponse, TopicsResponse, ValidateRequest,
};
use autopost_core::application::{
    Dispatcher, JobCreateInput, JobService, JobUpdateInput, ManualRunOutcome,
};
use autopost_core::domain::{Execution, Job};
use autopost_core::port::HistoryMaintenance;
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

type RpcResult<T> = Result<T, ErrorObjectOwned>;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    jobs: Arc<JobService>,
    dispatcher: Arc<Dispatcher>,
    maintenance: Arc<dyn HistoryMaintenance>,
    rate_limiter: RateLimiter,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(
        jobs: Arc<JobService>,
        dispatcher: Arc<Dispatcher>,
        maintenance: Arc<dyn HistoryMaintenance>,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            jobs,
            dispatcher,
            maintenance,
            rate_limiter,
            start_time: Instant::now(),
        }
    }

    /// Mutating methods spend a token first
    fn throttle(&self) -> RpcResult<()> {
        if self.rate_limiter.try_acquire() {
            Ok(())
        } else {
            debug!("Request throttled");
            Err(throttled())
        }
    }

    /// jobs.list.v1
    pub async fn list_jobs(&self) -> RpcResult<JobListResponse> {
        let jobs = self.jobs.list_jobs().await.map_err(to_rpc_error)?;
        Ok(JobListResponse { jobs })
    }

    /// jobs.get.v1
    pub async fn get_job(&self, req: JobIdRequest) -> RpcResult<Job> {
        self.jobs.get_job(req.job_id).await.map_err(to_rpc_error)
    }

    /// jobs.create.v1
    pub async fn create_job(&self, req: JobCreateInput) -> RpcResult<Job> {
        self.throttle()?;
        self.jobs.create_job(req).await.map_err(to_rpc_error)
    }

    /// jobs.update.v1
    pub async fn update_job(&self, req: JobUpdateInput) -> RpcResult<Job> {
        self.throttle()?;
        self.jobs.update_job(req).await.map_err(to_rpc_error)
    }

    /// jobs.delete.v1
    pub async fn delete_job(&self, req: JobIdRequest) -> RpcResult<DeleteResponse> {
        self.throttle()?;
        self.jobs.delete_job(req.job_id).await.map_err(to_rpc_error)?;
        Ok(DeleteResponse {
            job_id: req.job_id,
            deleted: true,
        })
    }

    /// jobs.pause.v1
    pub async fn pause_job(&self, req: JobIdRequest) -> RpcResult<Job> {
        self.throttle()?;
        self.jobs.pause_job(req.job_id).await.map_err(to_rpc_error)
    }

    /// jobs.resume.v1
    pub async fn resume_job(&self, req: JobIdRequest) -> RpcResult<Job> {
        self.throttle()?;
        self.jobs.resume_job(req.job_id).await.map_err(to_rpc_error)
    }

    /// jobs.execute.v1
    ///
    /// A run that cannot start is reported as error 4004 with the outcome in `data`.
    pub async fn execute_job(&self, req: JobIdRequest) -> RpcResult<ManualRunOutcome> {
        self.throttle()?;
        let outcome = self
            .jobs
            .execute_manually(req.job_id)
            .await
            .map_err(to_rpc_error)?;
        match outcome {
            ManualRunOutcome::Started { .. } => Ok(outcome),
            refused => Err(busy(&refused)),
        }
    }

    /// executions.list.v1
    pub async fn list_executions(
        &self,
        req: ListExecutionsRequest,
    ) -> RpcResult<ExecutionListResponse> {
        let executions = self
            .jobs
            .list_executions(req.job_id, req.limit)
            .await
            .map_err(to_rpc_error)?;
        Ok(ExecutionListResponse {
            job_id: req.job_id,
            executions,
        })
    }

    /// executions.validate.v1
    pub async fn validate_execution(&self, req: ValidateRequest) -> RpcResult<Execution> {
        self.throttle()?;
        self.jobs
            .validate_execution(&req.execution_id, req.decision)
            .await
            .map_err(to_rpc_error)
    }

    /// topics.add.v1
    pub async fn add_topics(&self, req: AddTopicsRequest) -> RpcResult<TopicsResponse> {
        self.throttle()?;
        let topics = self
            .jobs
            .add_topics(req.site_id, req.titles)
            .await
            .map_err(to_rpc_error)?;
        Ok(TopicsResponse {
            site_id: req.site_id,
            topics,
        })
    }

    /// topics.list.v1
    pub async fn list_topics(&self, req: SiteRequest) -> RpcResult<TopicsResponse> {
        let topics = self
            .jobs
            .list_topics(req.site_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(TopicsResponse {
            site_id: req.site_id,
            topics,
        })
    }

    /// admin.stats.v1
    pub async fn stats(&self) -> RpcResult<StatsResponse> {
        let history = self.maintenance.stats().await.map_err(to_rpc_error)?;
        Ok(StatsResponse {
            version: autopost_core::VERSION.to_string(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            active_workers: self.dispatcher.active_workers(),
            history,
        })
    }
}
