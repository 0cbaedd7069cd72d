//! Chat message text for a delivered date.

use crate::schedule::{month_start, week_start};
use chrono::NaiveDate;

fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Message posted alongside each report image.
pub fn report_message(target_date: NaiveDate) -> String {
    let target = fmt_date(target_date);
    format!(
        "Application User Data for *{target}*\n\n\
         Week to Date (WTD) taken into account: *{wtd}* - *{target}*\n\
         Month to Date (MTD) taken into account: *{mtd}* - *{target}*\n",
        target = target,
        wtd = fmt_date(week_start(target_date)),
        mtd = fmt_date(month_start(target_date)),
    )
}

/// Message posted by a dry run.
pub fn dry_run_message(target_date: NaiveDate) -> String {
    format!("*TEST:* Application User Data for *{}*", fmt_date(target_date))
}

/// Caption attached to the uploaded image.
pub fn image_caption(target_date: NaiveDate) -> String {
    format!("User activity {}", fmt_date(target_date))
}
