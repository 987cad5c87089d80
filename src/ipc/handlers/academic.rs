use rusqlite::{params, Connection};
use serde::Deserialize;
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_i64, get_str, parse_date};
use crate::ipc::types::{AppState, Request};
use crate::model::{AcademicYear, Exam, Term};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewExam {
    name: String,
    start_date: String,
    end_date: String,
    #[serde(default)]
    classes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewTerm {
    name: String,
    start_date: String,
    end_date: String,
    fee_deadline: String,
    #[serde(default)]
    exams: Vec<NewExam>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewAcademicYear {
    name: String,
    start_date: String,
    end_date: String,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    terms: Vec<NewTerm>,
}

fn load_exams(conn: &Connection, term_id: &str) -> anyhow::Result<Vec<Exam>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, start_date, end_date, classes
         FROM exams WHERE term_id = ? ORDER BY sort_order",
    )?;
    let exams = stmt
        .query_map([term_id], |row| {
            let classes: String = row.get(4)?;
            Ok(Exam {
                id: row.get(0)?,
                name: row.get(1)?,
                start_date: row.get(2)?,
                end_date: row.get(3)?,
                term_id: term_id.to_string(),
                classes: serde_json::from_str(&classes).unwrap_or_default(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(exams)
}

fn load_terms(conn: &Connection, year_id: i64) -> anyhow::Result<Vec<Term>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, start_date, end_date, fee_deadline
         FROM terms WHERE academic_year_id = ? ORDER BY sort_order",
    )?;
    let mut terms = stmt
        .query_map([year_id], |row| {
            Ok(Term {
                id: row.get(0)?,
                name: row.get(1)?,
                start_date: row.get(2)?,
                end_date: row.get(3)?,
                academic_year_id: year_id,
                exams: Vec::new(),
                fee_deadline: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for term in terms.iter_mut() {
        term.exams = load_exams(conn, &term.id)?;
    }
    Ok(terms)
}

fn load_years(conn: &Connection) -> anyhow::Result<Vec<AcademicYear>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, start_date, end_date, is_active
         FROM academic_years ORDER BY id",
    )?;
    let mut years = stmt
        .query_map([], |row| {
            let is_active: i64 = row.get(4)?;
            Ok(AcademicYear {
                id: row.get(0)?,
                name: row.get(1)?,
                start_date: row.get(2)?,
                end_date: row.get(3)?,
                is_active: is_active != 0,
                terms: Vec::new(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for year in years.iter_mut() {
        year.terms = load_terms(conn, year.id)?;
    }
    Ok(years)
}

fn load_year(conn: &Connection, year_id: i64) -> anyhow::Result<Option<AcademicYear>> {
    Ok(load_years(conn)?.into_iter().find(|y| y.id == year_id))
}

/// The one-active-year invariant is kept by a full overwrite: every row's
/// flag is rewritten relative to the chosen id.
fn enforce_single_active(conn: &Connection, year_id: i64) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE academic_years SET is_active = (id = ?)",
        [year_id],
    )?;
    Ok(())
}

fn insert_term(
    conn: &Connection,
    year_id: i64,
    term_id: &str,
    sort_order: i64,
    term: &NewTerm,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO terms(
           id, academic_year_id, name, start_date, end_date, fee_deadline, sort_order
         ) VALUES(?, ?, ?, ?, ?, ?, ?)",
        params![
            term_id,
            year_id,
            term.name,
            term.start_date,
            term.end_date,
            term.fee_deadline,
            sort_order,
        ],
    )?;
    for (j, exam) in term.exams.iter().enumerate() {
        conn.execute(
            "INSERT INTO exams(
               id, term_id, name, start_date, end_date, classes, sort_order
             ) VALUES(?, ?, ?, ?, ?, ?, ?)",
            params![
                format!("{}-{}", term_id, j + 1),
                term_id,
                exam.name,
                exam.start_date,
                exam.end_date,
                serde_json::to_string(&exam.classes)?,
                j as i64,
            ],
        )?;
    }
    Ok(())
}

fn handle_years_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    match load_years(&state.ledger) {
        Ok(years) => ok(&req.id, json!({ "years": years })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_years_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(year_id) = get_i64(&req.params, "yearId") else {
        return err(&req.id, "bad_params", "missing yearId", None);
    };
    match load_year(&state.ledger, year_id) {
        Ok(Some(year)) => ok(&req.id, json!({ "year": year })),
        Ok(None) => err(&req.id, "not_found", "academic year not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_years_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    match load_years(&state.ledger) {
        Ok(years) => {
            let current = years.into_iter().find(|y| y.is_active);
            ok(&req.id, json!({ "year": current }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_years_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let new: NewAcademicYear = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    if new.name.trim().is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }

    if let Err(e) = state.ledger.execute(
        "INSERT INTO academic_years(name, start_date, end_date, is_active)
         VALUES(?, ?, ?, ?)",
        params![new.name, new.start_date, new.end_date, new.is_active as i64],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    let year_id = state.ledger.last_insert_rowid();

    for (i, term) in new.terms.iter().enumerate() {
        let term_id = format!("{}-{}", year_id, i + 1);
        if let Err(e) = insert_term(&state.ledger, year_id, &term_id, i as i64, term) {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
    }

    if new.is_active {
        if let Err(e) = enforce_single_active(&state.ledger, year_id) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    match load_year(&state.ledger, year_id) {
        Ok(Some(year)) => ok(&req.id, json!({ "year": year })),
        Ok(None) => err(&req.id, "not_found", "academic year not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_years_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("year") else {
        return err(&req.id, "bad_params", "missing year", None);
    };
    let year: AcademicYear = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };

    let changed = match state.ledger.execute(
        "UPDATE academic_years SET name = ?, start_date = ?, end_date = ?, is_active = ?
         WHERE id = ?",
        params![
            year.name,
            year.start_date,
            year.end_date,
            year.is_active as i64,
            year.id,
        ],
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if changed == 0 {
        return err(&req.id, "not_found", "academic year not found", None);
    }

    // Wholesale replace: the submitted terms (and their exams) become the
    // year's terms, ids preserved as given.
    let replace = (|| -> anyhow::Result<()> {
        state.ledger.execute(
            "DELETE FROM exams WHERE term_id IN
               (SELECT id FROM terms WHERE academic_year_id = ?)",
            [year.id],
        )?;
        state
            .ledger
            .execute("DELETE FROM terms WHERE academic_year_id = ?", [year.id])?;
        for (i, term) in year.terms.iter().enumerate() {
            state.ledger.execute(
                "INSERT INTO terms(
                   id, academic_year_id, name, start_date, end_date, fee_deadline, sort_order
                 ) VALUES(?, ?, ?, ?, ?, ?, ?)",
                params![
                    term.id,
                    year.id,
                    term.name,
                    term.start_date,
                    term.end_date,
                    term.fee_deadline,
                    i as i64,
                ],
            )?;
            for (j, exam) in term.exams.iter().enumerate() {
                state.ledger.execute(
                    "INSERT INTO exams(
                       id, term_id, name, start_date, end_date, classes, sort_order
                     ) VALUES(?, ?, ?, ?, ?, ?, ?)",
                    params![
                        exam.id,
                        term.id,
                        exam.name,
                        exam.start_date,
                        exam.end_date,
                        serde_json::to_string(&exam.classes)?,
                        j as i64,
                    ],
                )?;
            }
        }
        Ok(())
    })();
    if let Err(e) = replace {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    if year.is_active {
        if let Err(e) = enforce_single_active(&state.ledger, year.id) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    match load_year(&state.ledger, year.id) {
        Ok(Some(year)) => ok(&req.id, json!({ "year": year })),
        Ok(None) => err(&req.id, "not_found", "academic year not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_years_set_active(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(year_id) = get_i64(&req.params, "yearId") else {
        return err(&req.id, "bad_params", "missing yearId", None);
    };
    match load_year(&state.ledger, year_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "academic year not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    if let Err(e) = enforce_single_active(&state.ledger, year_id) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    match load_year(&state.ledger, year_id) {
        Ok(Some(year)) => ok(&req.id, json!({ "year": year })),
        Ok(None) => err(&req.id, "not_found", "academic year not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_terms_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(year_id) = get_i64(&req.params, "yearId") else {
        return err(&req.id, "bad_params", "missing yearId", None);
    };
    let Some(term_id) = get_str(&req.params, "termId") else {
        return err(&req.id, "bad_params", "missing termId", None);
    };
    match load_terms(&state.ledger, year_id) {
        Ok(terms) => match terms.into_iter().find(|t| t.id == term_id) {
            Some(term) => ok(&req.id, json!({ "term": term })),
            None => err(&req.id, "not_found", "term not found", None),
        },
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// The term of the active year whose date range contains today, if any.
fn handle_terms_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    let years = match load_years(&state.ledger) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(current_year) = years.into_iter().find(|y| y.is_active) else {
        return ok(&req.id, json!({ "term": null }));
    };

    let today = chrono::Local::now().date_naive();
    let current = current_year.terms.into_iter().find(|term| {
        match (parse_date(&term.start_date), parse_date(&term.end_date)) {
            (Some(start), Some(end)) => start <= today && today <= end,
            _ => false,
        }
    });
    ok(&req.id, json!({ "term": current }))
}

fn handle_terms_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(year_id) = get_i64(&req.params, "yearId") else {
        return err(&req.id, "bad_params", "missing yearId", None);
    };
    let Some(raw) = req.params.get("term") else {
        return err(&req.id, "bad_params", "missing term", None);
    };
    let term: NewTerm = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };

    match load_year(&state.ledger, year_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "academic year not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let existing: i64 = match state.ledger.query_row(
        "SELECT COUNT(*) FROM terms WHERE academic_year_id = ?",
        [year_id],
        |r| r.get(0),
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let term_id = format!("{}-{}", year_id, existing + 1);
    if let Err(e) = insert_term(&state.ledger, year_id, &term_id, existing, &term) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    match load_terms(&state.ledger, year_id) {
        Ok(terms) => match terms.into_iter().find(|t| t.id == term_id) {
            Some(term) => ok(&req.id, json!({ "term": term })),
            None => err(&req.id, "not_found", "term not found", None),
        },
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_terms_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("term") else {
        return err(&req.id, "bad_params", "missing term", None);
    };
    let term: Term = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };

    let changed = match state.ledger.execute(
        "UPDATE terms SET name = ?, start_date = ?, end_date = ?, fee_deadline = ?
         WHERE id = ? AND academic_year_id = ?",
        params![
            term.name,
            term.start_date,
            term.end_date,
            term.fee_deadline,
            term.id,
            term.academic_year_id,
        ],
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if changed == 0 {
        return err(&req.id, "not_found", "term not found", None);
    }

    let replace = (|| -> anyhow::Result<()> {
        state
            .ledger
            .execute("DELETE FROM exams WHERE term_id = ?", [&term.id])?;
        for (j, exam) in term.exams.iter().enumerate() {
            state.ledger.execute(
                "INSERT INTO exams(
                   id, term_id, name, start_date, end_date, classes, sort_order
                 ) VALUES(?, ?, ?, ?, ?, ?, ?)",
                params![
                    exam.id,
                    term.id,
                    exam.name,
                    exam.start_date,
                    exam.end_date,
                    serde_json::to_string(&exam.classes)?,
                    j as i64,
                ],
            )?;
        }
        Ok(())
    })();
    if let Err(e) = replace {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "term": term }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "years.list" => Some(handle_years_list(state, req)),
        "years.get" => Some(handle_years_get(state, req)),
        "years.current" => Some(handle_years_current(state, req)),
        "years.create" => Some(handle_years_create(state, req)),
        "years.update" => Some(handle_years_update(state, req)),
        "years.setActive" => Some(handle_years_set_active(state, req)),
        "terms.get" => Some(handle_terms_get(state, req)),
        "terms.current" => Some(handle_terms_current(state, req)),
        "terms.create" => Some(handle_terms_create(state, req)),
        "terms.update" => Some(handle_terms_update(state, req)),
        _ => None,
    }
}
