use crate::models::{
    AdminOverview, BillingCycle, CycleSpend, RenewalWindowEntry, Role, ServiceCost, Subscription,
    SummaryAggregate, User,
};
use chrono::{Duration, Local, NaiveDate};
use tracing::warn;

pub const RENEWAL_WINDOW_DAYS: i64 = 7;

pub fn upcoming_renewals(subscriptions: &[Subscription]) -> Vec<RenewalWindowEntry> {
    upcoming_renewals_at(Local::now().date_naive(), subscriptions)
}

/// Subscriptions renewing between `today` and `today + 7` days, both ends
/// inclusive, in input order. Dates are whole calendar days.
pub fn upcoming_renewals_at(today: NaiveDate, subscriptions: &[Subscription]) -> Vec<RenewalWindowEntry> {
    let window_end = today + Duration::days(RENEWAL_WINDOW_DAYS);

    subscriptions
        .iter()
        .filter(|sub| sub.renewal_date >= today && sub.renewal_date <= window_end)
        .map(|sub| RenewalWindowEntry {
            id: sub.id,
            service_name: sub.service_name.clone(),
            cost: sub.cost.clone(),
            renewal_date: sub.renewal_date,
            days_until_renewal: (sub.renewal_date - today).num_days(),
        })
        .collect()
}

/// Billing-cycle totals and the overall average.
///
/// Weekly costs count toward the average but toward neither total.
pub fn summary(subscriptions: &[Subscription]) -> SummaryAggregate {
    let mut monthly_total = 0.0;
    let mut yearly_total = 0.0;
    let mut all_total = 0.0;

    for sub in subscriptions {
        let cost = parse_cost(sub);
        all_total += cost;
        match sub.billing_cycle {
            BillingCycle::Monthly => monthly_total += cost,
            BillingCycle::Yearly => yearly_total += cost,
            BillingCycle::Weekly => {}
        }
    }

    let average_cost = if subscriptions.is_empty() {
        0.0
    } else {
        all_total / subscriptions.len() as f64
    };

    SummaryAggregate {
        total_subscriptions: subscriptions.len(),
        monthly_total: money(monthly_total),
        yearly_total: money(yearly_total),
        average_cost: money(average_cost),
    }
}

pub fn spending_by_cycle(subscriptions: &[Subscription]) -> Vec<CycleSpend> {
    BillingCycle::ALL
        .into_iter()
        .filter_map(|cycle| {
            let mut matched = subscriptions.iter().filter(|sub| sub.billing_cycle == cycle).peekable();
            matched.peek()?;
            let total: f64 = matched.map(parse_cost).sum();
            Some(CycleSpend {
                billing_cycle: cycle,
                total: money(total),
            })
        })
        .collect()
}

/// Services ordered by cost, most expensive first. Ties keep input order.
pub fn top_services(subscriptions: &[Subscription]) -> Vec<ServiceCost> {
    let mut services: Vec<ServiceCost> = subscriptions
        .iter()
        .map(|sub| ServiceCost {
            service_name: sub.service_name.clone(),
            cost: parse_cost(sub),
            billing_cycle: sub.billing_cycle,
        })
        .collect();
    services.sort_by(|a, b| b.cost.total_cmp(&a.cost));
    services
}

pub fn shared_subscriptions(subscriptions: &[Subscription]) -> Vec<&Subscription> {
    subscriptions.iter().filter(|sub| sub.is_shared).collect()
}

pub fn admin_overview(subscriptions: &[Subscription], users: &[User]) -> AdminOverview {
    admin_overview_at(Local::now().date_naive(), subscriptions, users)
}

pub fn admin_overview_at(today: NaiveDate, subscriptions: &[Subscription], users: &[User]) -> AdminOverview {
    let mut upcoming_renewals = upcoming_renewals_at(today, subscriptions);
    upcoming_renewals.sort_by_key(|entry| entry.renewal_date);

    AdminOverview {
        total_subscriptions: subscriptions.len(),
        total_users: users.iter().filter(|user| user.role == Role::User).count(),
        total_spending: money(subscriptions.iter().map(parse_cost).sum()),
        upcoming_renewals,
    }
}

fn parse_cost(sub: &Subscription) -> f64 {
    match sub.cost.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => {
            warn!(id = sub.id, cost = %sub.cost, "unparsable subscription cost, counting as 0");
            0.0
        }
    }
}

fn money(value: f64) -> String {
    format!("{value:.2}")
}
