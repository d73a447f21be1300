use std::fmt::Write;

use chrono::NaiveDate;

use crate::config::Settings;
use crate::models::{BehaviorReport, BehaviorType, Behaviors};
use crate::pillars::Taxonomy;

const DEFAULT_ACCENT: &str = "#dddddd";

#[derive(Debug, Clone)]
pub struct ComposedEmail {
    pub subject: String,
    pub html: String,
}

/// Drops angle brackets from user-entered text before it is placed in HTML.
fn sanitize(value: &str) -> String {
    value.chars().filter(|ch| *ch != '<' && *ch != '>').collect()
}

fn greeting(parent1_first: &str, parent2_first: &str) -> String {
    let parent1 = sanitize(parent1_first);
    let parent2 = sanitize(parent2_first);

    match (parent1.trim(), parent2.trim()) {
        ("", _) => "Dear Parent".to_string(),
        (first, "") => format!("Dear {first}"),
        (first, second) => format!("Dear {first} & {second}"),
    }
}

fn with_article(location: &str) -> String {
    let lower = location.to_lowercase();
    if ["the ", "a ", "an "].iter().any(|article| lower.starts_with(article)) {
        location.to_string()
    } else {
        format!("the {location}")
    }
}

fn behaviors_html(behaviors: &Behaviors) -> String {
    match behaviors {
        Behaviors::List(_) => {
            let items = behaviors.normalized();
            if items.is_empty() {
                return String::new();
            }
            let mut html = String::from("<ul>");
            for item in items {
                let _ = write!(html, "<li>{}</li>", sanitize(&item));
            }
            html.push_str("</ul>");
            html
        }
        Behaviors::Text(text) if !text.trim().is_empty() => format!("<p>{}</p>", sanitize(text)),
        Behaviors::Text(_) => String::new(),
    }
}

fn pillars_html(selected: &[String], taxonomy: &Taxonomy) -> String {
    if selected.is_empty() {
        return String::new();
    }

    let names: Vec<String> = selected
        .iter()
        .map(|name| match taxonomy.get(name) {
            Some(pillar) => format!(
                "<span style=\"color:{}; font-weight:bold;\">{}</span>",
                sanitize(&pillar.color),
                sanitize(&pillar.name)
            ),
            None => sanitize(name),
        })
        .collect();

    format!(
        "<p style=\"margin-top: 10px;\"><strong>Character Pillar{} Involved:</strong> {}</p>",
        if selected.len() > 1 { "s" } else { "" },
        names.join(", ")
    )
}

/// Renders the parent notification for an enriched, classified report.
///
/// The header accent uses the first selected pillar's color.
pub fn compose(
    report: &BehaviorReport,
    teacher_name: &str,
    taxonomy: &Taxonomy,
    settings: &Settings,
    date: NaiveDate,
) -> ComposedEmail {
    let student = sanitize(&report.student_first);
    let location = with_article(&sanitize(&report.location));
    let comments = sanitize(&report.comments);
    let teacher = sanitize(teacher_name);
    let good_news = report.behavior_type == BehaviorType::GoodNews;

    let accent = report
        .selected_pillars
        .first()
        .and_then(|name| taxonomy.get(name))
        .map(|pillar| sanitize(&pillar.color))
        .unwrap_or_else(|| DEFAULT_ACCENT.to_string());

    let mut html = String::new();

    html.push_str("<!DOCTYPE html><html><head><style>");
    html.push_str("body{font-family:Arial,Helvetica,sans-serif;line-height:1.5;color:#333;max-width:600px;margin:0 auto;padding:20px;}");
    html.push_str(".email-container{border:1px solid #ddd;border-radius:8px;overflow:hidden;}");
    let _ = write!(
        html,
        ".header{{padding:15px 20px; border-top: 5px solid {accent}; border-bottom:1px solid #ddd;}}"
    );
    let title_color = if good_news { "#2e7d32" } else { "#b71c1c" };
    let _ = write!(
        html,
        ".header h2{{margin:0;color:{title_color};font-size:20px;}}"
    );
    html.push_str(".date{font-size:14px;margin-top:5px; color: #555;}");
    html.push_str(".content{padding:20px;background-color:#fff;}");
    html.push_str(".comments-box{background-color:#f5f5f5;padding:15px;margin:15px 0;border-radius:4px;border-left: 4px solid #ccc;}");
    html.push_str(".comments-box strong { color: #333; }");
    html.push_str(".footer{background-color:#f9f9f9;padding:12px 20px;font-size:12px;color:#777;border-top:1px solid #ddd;}");
    html.push_str("</style></head><body>");

    html.push_str("<div class=\"email-container\">");
    let title = if good_news {
        format!("Good News about {student}!")
    } else {
        format!("Behavior Update for {student}")
    };
    let _ = write!(html, "<div class=\"header\"><h2>{title}</h2>");
    let _ = write!(
        html,
        "<div class=\"date\">Date: {}</div></div>",
        date.format("%-m/%-d/%Y")
    );

    html.push_str("<div class=\"content\">");
    let _ = write!(
        html,
        "<p>{},</p>",
        greeting(
            &report.enrichment.parent1.first,
            &report.enrichment.parent2.first
        )
    );

    if good_news {
        let _ = write!(
            html,
            "<p>We wanted to share some positive news! Today, {student} demonstrated positive character traits in {location}. Specifically, we observed:</p>"
        );
    } else {
        let plural = if report.behaviors.normalized().len() > 1 { "s" } else { "" };
        let _ = write!(
            html,
            "<p>{student} had a \"Stop and Think\" moment today in {location}. This involved the following behavior{plural}:</p>"
        );
    }

    html.push_str(&behaviors_html(&report.behaviors));
    html.push_str(&pillars_html(&report.selected_pillars, taxonomy));

    if !comments.trim().is_empty() {
        let _ = write!(
            html,
            "<div class=\"comments-box\"><p><strong>Teacher's Comments:</strong><br>{}</p></div>",
            comments.replace('\n', "<br>")
        );
    }

    if good_news {
        let _ = write!(
            html,
            "<p>We recognized {student} for these positive actions contributing to our school community. Please join us in celebrating this achievement!</p>"
        );
    } else {
        let _ = write!(
            html,
            "<p>These moments provide opportunities for growth and learning about making positive choices. We encourage you to discuss this with {student} at home to reinforce expectations for behavior at school.</p>"
        );
        html.push_str("<p>If you have any questions, please don't hesitate to reach out.</p>");
    }

    let _ = write!(html, "<p>Sincerely,</p><p>{teacher}</p>");
    html.push_str("</div>");
    let _ = write!(
        html,
        "<div class=\"footer\"><p>This message was sent from the {} Behavior System.</p></div>",
        sanitize(&settings.school_name)
    );
    html.push_str("</div></body></html>");

    ComposedEmail {
        subject: settings.subject_for(report.behavior_type).to_string(),
        html,
    }
}
