use relq::{QueryComposite, QueryConfig, RelqError, Row, ScalarValue, Select, Table, TableRef, With, col, lit};

fn org() -> Table {
    let people = [
        ("Alice", None),
        ("Bob", Some("Alice")),
        ("Cindy", Some("Alice")),
        ("Dave", Some("Bob")),
        ("Emma", Some("Bob")),
        ("Fred", Some("Cindy")),
        ("Gail", Some("Cindy")),
    ];
    Table::try_from_values(
        "org",
        ["name", "boss"],
        people.map(|(name, boss)| vec![ScalarValue::from(name), boss.into()]),
    )
    .unwrap()
}

fn codes() -> Table {
    Table::try_from_values(
        "names",
        ["code", "name"],
        [(1, "Life"), (2, "Pi"), (3, "Ee")].map(|(code, name)| vec![ScalarValue::from(code), name.into()]),
    )
    .unwrap()
}

fn ints(values: Vec<ScalarValue>) -> Vec<i64> {
    values.into_iter().map(|v| v.as_i64().unwrap()).collect()
}

#[test]
fn recursive_org_chart() {
    logutil::init_test();

    let seed = Select::new(
        QueryComposite::new()
            .column("name", col("name"))
            .column("level", lit(0)),
    )
    .unwrap()
    .from_([org()])
    .unwrap()
    .where_(|r| Ok(r["boss"].is_null()))
    .unwrap();

    let step = Select::new(
        QueryComposite::new()
            .column("name", col("org.name"))
            .column("level", |r: &Row| Ok(r.get("under_alice.level")?.as_i64()? + 1)),
    )
    .unwrap()
    .from_([TableRef::named("under_alice"), org().into()])
    .unwrap()
    .where_(|r| Ok(r.get("org.boss")? == r.get("under_alice.name")?))
    .unwrap();

    let query = With::new()
        .table("under_alice", seed.union(&step).unwrap())
        .unwrap()
        .query(
            Select::new(QueryComposite::new().column("line", |r: &Row| {
                let level = r["level"].as_i64()? as usize;
                Ok(format!("{}{}", ".".repeat(level * 3), r["name"].as_str()?))
            }))
            .unwrap()
            .from_([TableRef::named("under_alice")])
            .unwrap(),
        );

    let lines: Vec<_> = query
        .fetch_all_values()
        .unwrap()
        .into_iter()
        .map(|v| v.to_string())
        .collect();
    assert_eq!(
        vec![
            "Alice",
            "...Bob",
            "...Cindy",
            "......Dave",
            "......Emma",
            "......Fred",
            "......Gail",
        ],
        lines
    );
}

#[test]
fn recursive_counter() {
    let seed = Select::new(QueryComposite::new().column("x", lit(1))).unwrap();
    let step = Select::new(QueryComposite::new().column("x", |r: &Row| Ok(r["x"].as_i64()? + 1)))
        .unwrap()
        .from_([TableRef::named("cnt")])
        .unwrap()
        .where_(|r| Ok(r["x"].as_i64()? < 10))
        .unwrap();

    let query = With::new()
        .table("cnt", seed.union(&step).unwrap())
        .unwrap()
        .query(Select::star().from_([TableRef::named("cnt")]).unwrap());

    assert_eq!((1..=10).collect::<Vec<_>>(), ints(query.fetch_all_values().unwrap()));
    assert_eq!(vec!["x"], query.output_columns().unwrap());
}

#[test]
fn recursion_depth_limit() {
    let seed = Select::new(QueryComposite::new().column("x", lit(1))).unwrap();
    let step = Select::new(QueryComposite::new().column("x", |r: &Row| Ok(r["x"].as_i64()? + 1)))
        .unwrap()
        .from_([TableRef::named("forever")])
        .unwrap();

    let config = QueryConfig {
        max_recursion_depth: 20,
        ..Default::default()
    };
    let query = With::new()
        .table("forever", seed.union(&step).unwrap())
        .unwrap()
        .with_config(config)
        .query(Select::star().from_([TableRef::named("forever")]).unwrap());

    assert!(matches!(query.fetch(), Err(RelqError::Usage(_))));
}

#[test]
fn union_of_table_expression_with_itself() {
    let the_codes = Select::new(QueryComposite::new().column("code", col("code")))
        .unwrap()
        .from_([codes()])
        .unwrap();

    let query = With::new().table("the_codes", the_codes).unwrap().query(
        Select::star()
            .from_([TableRef::named("the_codes")])
            .unwrap()
            .union(&Select::star().from_([TableRef::named("the_codes")]).unwrap())
            .unwrap(),
    );

    assert_eq!(vec![1, 2, 3, 1, 2, 3], ints(query.fetch_all_values().unwrap()));
}

#[test]
fn join_with_table_expression() {
    let values = Table::try_from_values(
        "values",
        ["c1", "c2"],
        [(1, 42.0), (2, 3.14), (3, 2.72)].map(|(c1, c2)| vec![ScalarValue::from(c1), c2.into()]),
    )
    .unwrap();
    let small = Select::star()
        .from_([values])
        .unwrap()
        .where_(|r| Ok(r["c2"].as_f64()? < 10.0))
        .unwrap();

    let query = With::new().table("small", small).unwrap().query(
        Select::new(
            QueryComposite::new()
                .column("name", col("n.name"))
                .column("value", col("s.c2")),
        )
        .unwrap()
        .from_([TableRef::named("small").with_alias("s"), codes().with_alias("n").into()])
        .unwrap()
        .where_(|r| Ok(r.get("s.c1")? == r.get("n.code")?))
        .unwrap(),
    );

    let rows = query.fetch().unwrap();
    let names: Vec<_> = rows.iter().map(|r| r["name"].to_string()).collect();
    assert_eq!(vec!["Pi", "Ee"], names);
    assert_eq!(ScalarValue::Float64(3.14), rows[0]["value"]);
}

#[test]
fn table_expressions_materialize() {
    let with = With::new()
        .table(
            "doubled",
            Select::new(QueryComposite::new().column("d", |r: &Row| Ok(r["code"].as_i64()? * 2)))
                .unwrap()
                .from_([codes()])
                .unwrap(),
        )
        .unwrap();
    let query = with.query(Select::star().from_([TableRef::named("doubled")]).unwrap());

    let tables = query.tables().unwrap();
    assert_eq!(1, tables.len());
    assert_eq!("doubled", tables[0].name());
    assert_eq!(vec![2, 4, 6], ints(query.fetch_all_values().unwrap()));

    let table = query.fetch_table("copy").unwrap();
    assert_eq!(3, table.len());
    assert_eq!(vec!["d"], table.columns().collect::<Vec<_>>());
}

#[test]
fn unknown_table_expression() {
    let query = With::new().query(Select::star().from_([TableRef::named("missing")]).unwrap());
    assert!(matches!(query.fetch(), Err(RelqError::Usage(_))));
}

#[test]
fn fetch_all_values_checks_columns_first() {
    let pairs = Select::star()
        .from_([Table::empty("t", ["a", "b"]).unwrap()])
        .unwrap();
    let query = With::new()
        .table("x", pairs)
        .unwrap()
        .query(Select::star().from_([TableRef::named("x")]).unwrap());

    assert!(matches!(query.fetch_all_values(), Err(RelqError::Usage(_))));

    let single = With::new()
        .table("x", Select::star().from_([codes()]).unwrap())
        .unwrap()
        .query(
            Select::new(QueryComposite::new().column("code", col("code")))
                .unwrap()
                .from_([TableRef::named("x")])
                .unwrap(),
        );
    assert_eq!(vec![1, 2, 3], ints(single.fetch_all_values().unwrap()));
}
