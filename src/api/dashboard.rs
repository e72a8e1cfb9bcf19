//! One call that gives each role the numbers its home screen needs.

use std::collections::BTreeMap;

use actix_web::{HttpResponse, web};
use chrono::Datelike;
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::instrument;
use utoipa::ToSchema;

use crate::{
    api::{
        access::team_condition,
        announcement::visible_announcements,
        attendance::{DaySnapshot, TeamMemberDay, team_snapshots},
        leave_request::{LeaveBalance, balance_for},
        notification::unread_count_for,
        roster::active_day,
    },
    auth::auth::AuthUser,
    config::Config,
    error::ApiResult,
    model::{announcement::Announcement, role::Role},
    utils::{
        db_utils::{SqlValue, to_arguments},
        outlet_cache,
    },
};

const LATEST_ANNOUNCEMENTS: u32 = 5;

/// Derived day status (`masuk`, `mangkir`, ...) to member count.
pub type StatusCounts = BTreeMap<String, i64>;

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct TeamSummary {
    pub members: i64,
    pub by_status: StatusCounts,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct PendingApprovals {
    pub leave: i64,
    pub corrections: i64,
    pub shift_changes: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OutletSummary {
    pub outlet_id: Option<u64>,
    pub outlet_name: Option<String>,
    pub members: i64,
    pub by_status: StatusCounts,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct CompanySummary {
    pub active_employees: i64,
    pub active_outlets: i64,
    /// Present only for admins
    pub users_by_role: Option<BTreeMap<String, i64>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Dashboard {
    pub role: Role,
    pub today: DaySnapshot,
    pub leave_balance: LeaveBalance,
    pub unread_notifications: i64,
    pub announcements: Vec<Announcement>,
    /// Supervisor and above
    pub team: Option<TeamSummary>,
    /// Supervisor and above
    pub pending_approvals: Option<PendingApprovals>,
    /// Manager and above
    pub outlets: Option<Vec<OutletSummary>>,
    /// HR and admin
    pub company: Option<CompanySummary>,
}

pub fn summarize_team(team: &[TeamMemberDay]) -> TeamSummary {
    let mut summary = TeamSummary::default();
    for member in team {
        summary.members += 1;
        *summary
            .by_status
            .entry(member.snapshot.status.as_ref().to_string())
            .or_default() += 1;
    }
    summary
}

/// Groups the team by outlet; members without an outlet come last.
pub fn summarize_outlets(team: &[TeamMemberDay], names: &BTreeMap<u64, String>) -> Vec<OutletSummary> {
    let mut grouped: BTreeMap<Option<u64>, Vec<&TeamMemberDay>> = BTreeMap::new();
    for member in team {
        grouped.entry(member.outlet_id).or_default().push(member);
    }

    let mut outlets: Vec<OutletSummary> = grouped
        .into_iter()
        .map(|(outlet_id, members)| {
            let mut by_status = StatusCounts::new();
            for m in &members {
                *by_status
                    .entry(m.snapshot.status.as_ref().to_string())
                    .or_default() += 1;
            }
            OutletSummary {
                outlet_id,
                outlet_name: outlet_id.and_then(|id| names.get(&id).cloned()),
                members: members.len() as i64,
                by_status,
            }
        })
        .collect();
    outlets.sort_by_key(|o| o.outlet_id.is_none());
    outlets
}

async fn count_pending(
    auth: &AuthUser,
    pool: &MySqlPool,
    table: &str,
    owner_column: &str,
) -> ApiResult<i64> {
    let mut conditions = vec!["status = 'pending'".to_string(), format!("{owner_column} <> ?")];
    let mut values = vec![SqlValue::U64(auth.user_id)];
    if let Some((condition, value)) = team_condition(auth, owner_column)? {
        conditions.push(condition);
        values.push(value);
    }

    let sql = format!("SELECT COUNT(*) FROM {table} WHERE {}", conditions.join(" AND "));
    Ok(sqlx::query_scalar_with::<_, i64, _>(&sql, to_arguments(values))
        .fetch_one(pool)
        .await?)
}

async fn pending_approvals(auth: &AuthUser, pool: &MySqlPool) -> ApiResult<PendingApprovals> {
    Ok(PendingApprovals {
        leave: count_pending(auth, pool, "leave_requests", "user_id").await?,
        corrections: count_pending(auth, pool, "corrections", "user_id").await?,
        shift_changes: count_pending(auth, pool, "shift_change_requests", "requester_id").await?,
    })
}

async fn company_summary(auth: &AuthUser, pool: &MySqlPool) -> ApiResult<CompanySummary> {
    let active_employees =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE is_active = 1")
            .fetch_one(pool)
            .await?;
    let active_outlets =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM outlets WHERE is_active = 1")
            .fetch_one(pool)
            .await?;

    let users_by_role = if auth.role == Role::Admin {
        let rows = sqlx::query_as::<_, (u8, i64)>(
            "SELECT role_id, COUNT(*) FROM users WHERE is_active = 1 GROUP BY role_id",
        )
        .fetch_all(pool)
        .await?;
        Some(
            rows.into_iter()
                .map(|(role_id, count)| {
                    let name = Role::from_id(role_id)
                        .map(|r| r.as_ref().to_string())
                        .unwrap_or_else(|| format!("role_{role_id}"));
                    (name, count)
                })
                .collect(),
        )
    } else {
        None
    };

    Ok(CompanySummary {
        active_employees,
        active_outlets,
        users_by_role,
    })
}

/// Home screen data for the caller's role
#[utoipa::path(
    get,
    path = "/api/dashboard",
    responses((status = 200, body = Dashboard)),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
#[instrument(skip(pool, config), fields(user_id = auth.user_id, role = %auth.role))]
pub async fn dashboard(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let pool = pool.get_ref();
    let now = config.local_now();

    let today = DaySnapshot::build(active_day(pool, auth.user_id, now).await?, now, &config);
    let leave_balance = balance_for(pool, &config, auth.user_id, now.year()).await?;
    let unread_notifications = unread_count_for(pool, auth.user_id).await?;
    let announcements = visible_announcements(pool, now, LATEST_ANNOUNCEMENTS).await?;

    let mut view = Dashboard {
        role: auth.role,
        today,
        leave_balance,
        unread_notifications,
        announcements,
        team: None,
        pending_approvals: None,
        outlets: None,
        company: None,
    };

    if auth.is_employee() {
        return Ok(HttpResponse::Ok().json(view));
    }

    let team = team_snapshots(&auth, pool, &config, now.date(), None).await?;
    view.team = Some(summarize_team(&team));
    view.pending_approvals = Some(pending_approvals(&auth, pool).await?);

    if auth.role.sees_everyone() {
        let names: BTreeMap<u64, String> = outlet_cache::active_outlets(pool)
            .await?
            .iter()
            .map(|o| (o.id, o.name.clone()))
            .collect();
        view.outlets = Some(summarize_outlets(&team, &names));
    }
    if auth.role.is_hr_or_admin() {
        view.company = Some(company_summary(&auth, pool).await?);
    }

    Ok(HttpResponse::Ok().json(view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attendance::DayStatus;
    use chrono::NaiveDate;

    fn member(user_id: u64, outlet_id: Option<u64>, status: DayStatus) -> TeamMemberDay {
        TeamMemberDay {
            user_id,
            full_name: format!("User {user_id}"),
            outlet_id,
            snapshot: DaySnapshot {
                date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                has_checked_in: false,
                has_checked_out: false,
                on_leave: false,
                is_scheduled_off: false,
                shift_id: None,
                status,
                late_minutes: 0,
                worked_minutes: 0,
                target_minutes: 480,
                correction_pending: false,
                can_request_correction: false,
                record: None,
            },
        }
    }

    #[test]
    fn team_counts_by_status() {
        let team = vec![
            member(1, Some(1), DayStatus::Masuk),
            member(2, Some(1), DayStatus::Terlambat),
            member(3, Some(2), DayStatus::Masuk),
        ];
        let summary = summarize_team(&team);
        assert_eq!(summary.members, 3);
        assert_eq!(summary.by_status["masuk"], 2);
        assert_eq!(summary.by_status["terlambat"], 1);
    }

    #[test]
    fn outlets_group_and_unassigned_last() {
        let team = vec![
            member(1, None, DayStatus::BelumMasuk),
            member(2, Some(2), DayStatus::Cuti),
            member(3, Some(1), DayStatus::Masuk),
        ];
        let names = BTreeMap::from([(1, "Braga".to_string())]);
        let outlets = summarize_outlets(&team, &names);
        assert_eq!(outlets.len(), 3);
        assert_eq!(outlets[0].outlet_id, Some(1));
        assert_eq!(outlets[0].outlet_name.as_deref(), Some("Braga"));
        assert_eq!(outlets[1].outlet_name, None);
        assert_eq!(outlets[2].outlet_id, None);
        assert_eq!(outlets[2].by_status["belum_masuk"], 1);
    }
}
