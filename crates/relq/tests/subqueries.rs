use std::cell::Cell;

use relq::{
    Aggregate, QueryComposite, RelqError, Result, Row, STAR, ScalarValue, Select, Table, col, exists,
    fetch_first_value,
};

fn employees() -> Table {
    let rows = [
        (100, "Steven", "King", 24000.0, 0, 90),
        (101, "Neena", "Kochhar", 17000.0, 100, 90),
        (102, "Lex", "De Haan", 17000.0, 100, 90),
        (103, "Alexander", "Hunold", 9000.0, 102, 60),
        (104, "Bruce", "Ernst", 6000.0, 103, 60),
        (105, "David", "Austin", 4800.0, 103, 60),
        (108, "Nancy", "Greenberg", 12000.0, 101, 100),
        (109, "Daniel", "Faviet", 9000.0, 108, 100),
    ];
    Table::try_from_values(
        "employees",
        ["employee_id", "first_name", "last_name", "salary", "manager_id", "department_id"],
        rows.map(|(id, first, last, salary, manager, dept)| {
            vec![
                ScalarValue::from(id),
                first.into(),
                last.into(),
                salary.into(),
                manager.into(),
                dept.into(),
            ]
        }),
    )
    .unwrap()
}

fn departments() -> Table {
    let rows = [
        (10, "Administration", 1700),
        (60, "IT", 1400),
        (90, "Executive", 1700),
        (100, "Finance", 1700),
        (110, "Accounting", 1700),
    ];
    Table::try_from_values(
        "departments",
        ["department_id", "department_name", "location_id"],
        rows.map(|(id, name, location)| vec![ScalarValue::from(id), name.into(), location.into()]),
    )
    .unwrap()
}

fn strings(values: Vec<ScalarValue>) -> Vec<String> {
    values.into_iter().map(|v| v.to_string()).collect()
}

#[test]
fn correlated_scalar_subquery() {
    logutil::init_test();

    let department_name = Select::new(QueryComposite::new().column("department_name", col("departments.department_name")))
        .unwrap()
        .from_([departments()])
        .unwrap()
        .where_(|r| Ok(r.get("departments.department_id")? == r.get("employees.department_id")?))
        .unwrap();

    let query = Select::new(
        QueryComposite::new()
            .column("first_name", col("employees.first_name"))
            .column("department_name", move |r: &Row| {
                Ok(department_name
                    .correlate(r)
                    .fetch_first_value()?
                    .unwrap_or_default())
            }),
    )
    .unwrap()
    .from_([employees()])
    .unwrap();

    let rows = query.fetch().unwrap();
    let pairs: Vec<_> = rows
        .iter()
        .map(|r| (r["first_name"].to_string(), r["department_name"].to_string()))
        .collect();
    assert_eq!(8, pairs.len());
    assert_eq!(("Steven".to_string(), "Executive".to_string()), pairs[0]);
    assert_eq!(("Alexander".to_string(), "IT".to_string()), pairs[3]);
    assert_eq!(("Daniel".to_string(), "Finance".to_string()), pairs[7]);
}

#[test]
fn correlated_exists() {
    // Employees whose manager is King.
    let managed_by_king = Select::star()
        .from_([employees().with_alias("b")])
        .unwrap()
        .where_(|r| {
            Ok(r.get("b.employee_id")? == r.get("e.manager_id")? && r.get("b.last_name")?.as_str()? == "King")
        })
        .unwrap();

    let query = Select::new(QueryComposite::new().column("last_name", col("e.last_name")))
        .unwrap()
        .from_([employees().with_alias("e")])
        .unwrap()
        .where_(move |r| managed_by_king.correlate(r).exists())
        .unwrap();

    assert_eq!(
        vec!["Kochhar", "De Haan"],
        strings(query.fetch_all_values().unwrap())
    );
}

#[test]
fn inner_names_shadow_outer() {
    let inner = Select::new(QueryComposite::new().column("id", col("employee_id")))
        .unwrap()
        .from_([employees()])
        .unwrap()
        .where_(|r| Ok(r["employee_id"].as_i64()? == 100))
        .unwrap();
    let outer = Row::from_pairs([("employee_id", 105)]).unwrap();

    let values = inner.correlate(&outer).fetch_all_values().unwrap();
    assert_eq!(vec![ScalarValue::Int64(100)], values);

    // Names missing locally resolve against the outer row.
    let with_outer = Select::new(QueryComposite::new().column("target", col("target")))
        .unwrap()
        .correlate(&Row::from_pairs([("target", "x")]).unwrap());
    assert_eq!(
        Some(ScalarValue::from("x")),
        with_outer.fetch_first_value().unwrap()
    );
}

#[test]
fn subquery_in_from() {
    let high_salaried = Table::from_query(
        "high_salaried",
        &Select::new(
            QueryComposite::new()
                .column("first_name", col("first_name"))
                .column("salary", |r: &Row| Ok(r["salary"].as_f64()? as i64)),
        )
        .unwrap()
        .from_([employees()])
        .unwrap()
        .where_(|r| Ok(r["salary"].as_f64()? > 10000.0))
        .unwrap(),
    )
    .unwrap();

    let rows = Select::star().from_([high_salaried]).unwrap().fetch().unwrap();
    let pairs: Vec<_> = rows
        .iter()
        .map(|r| (r["first_name"].to_string(), r["salary"].as_i64().unwrap()))
        .collect();
    assert_eq!(
        vec![
            ("Steven".to_string(), 24000),
            ("Neena".to_string(), 17000),
            ("Lex".to_string(), 17000),
            ("Nancy".to_string(), 12000),
        ],
        pairs
    );
    assert_eq!(
        vec!["first_name", "salary"],
        rows[0].columns().collect::<Vec<_>>()
    );
}

#[test]
fn subquery_in_where() {
    let department_ids = Select::new(QueryComposite::new().column("department_id", col("department_id")))
        .unwrap()
        .from_([departments()])
        .unwrap()
        .where_(|r| Ok(r["location_id"].as_i64()? > 1500))
        .unwrap()
        .fetch_all_values()
        .unwrap();

    let query = Select::new(QueryComposite::new().column("first_name", col("first_name")))
        .unwrap()
        .from_([employees()])
        .unwrap()
        .where_(move |r| Ok(department_ids.contains(&r["department_id"])))
        .unwrap();

    assert_eq!(
        vec!["Steven", "Neena", "Lex", "Nancy", "Daniel"],
        strings(query.fetch_all_values().unwrap())
    );
}

#[test]
fn subquery_in_having() {
    let overall = Select::new(QueryComposite::new().aggregate("average", Aggregate::avg(col("salary"))))
        .unwrap()
        .from_([employees()])
        .unwrap()
        .fetch_first_value()
        .unwrap()
        .unwrap()
        .as_f64()
        .unwrap();

    let query = Select::new(
        QueryComposite::new()
            .column("department_id", col("department_id"))
            .aggregate("avg_salary", Aggregate::avg(col("salary"))),
    )
    .unwrap()
    .from_([employees()])
    .unwrap()
    .group_by(["department_id"])
    .unwrap()
    .having(move |g| Ok(g.aggregate(&Aggregate::avg(col("salary")))?.as_f64()? > overall))
    .unwrap();

    assert_eq!(
        vec![ScalarValue::Int64(90)],
        query.fetch_column_values("department_id").unwrap()
    );
}

#[test]
fn exists_pulls_at_most_one_row() {
    let pulls = Cell::new(0);
    let rows = std::iter::from_fn(|| {
        pulls.set(pulls.get() + 1);
        match pulls.get() {
            1 => Some(Row::from_pairs([("x", 1)])),
            _ => Some(Err(RelqError::expression("pulled past the first row"))),
        }
    });
    assert!(exists(rows).unwrap());
    assert_eq!(1, pulls.get());

    let pulls = Cell::new(0);
    let rows = std::iter::from_fn(|| {
        pulls.set(pulls.get() + 1);
        match pulls.get() {
            1 => Some(Row::from_pairs([("x", 1)])),
            _ => Some(Err(RelqError::expression("pulled past the first row"))),
        }
    });
    assert_eq!(Some(ScalarValue::Int64(1)), fetch_first_value(rows).unwrap());
    assert_eq!(1, pulls.get());
}

#[test]
fn exists_over_query() {
    let t = Table::try_from_values("t", ["x"], (1..=3).map(|x| vec![ScalarValue::from(x)])).unwrap();
    let evaluated = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = evaluated.clone();
    let query = Select::star()
        .from_([t])
        .unwrap()
        .where_(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Ok(true)
        })
        .unwrap();

    assert!(query.exists().unwrap());
    assert_eq!(1, evaluated.load(std::sync::atomic::Ordering::Relaxed));

    let none = Select::star()
        .from_([Table::empty("e", ["x"]).unwrap()])
        .unwrap();
    assert!(!none.exists().unwrap());
}

#[test]
fn fetch_all_values_requires_one_column() {
    let query = Select::star().from_([departments()]).unwrap();
    assert!(matches!(query.fetch_all_values(), Err(RelqError::Usage(_))));

    let names: Vec<_> = Select::new(QueryComposite::from(STAR))
        .unwrap()
        .from_([departments()])
        .unwrap()
        .fetch_column_values("department_name")
        .unwrap();
    assert_eq!(5, names.len());

    let first: Result<_> = Select::star()
        .from_([Table::empty("e", ["x"]).unwrap()])
        .unwrap()
        .fetch_first_value();
    assert_eq!(None, first.unwrap());
}
