//! Synthetic engine for the demo driver.
//!
//! Builds a small portfolio and a compiled view over it, then produces cycles
//! with randomly drifting prices and a discount rate.

use crate::types::{
    CalculationConfiguration, ColumnDefinition, CompiledViewDefinition, ComputedValueResult, DependencyGraph,
    DependencyNode, ExecutionLog, LabelledVector, LogLevel, ObjectId, Portfolio, PortfolioNode, Position, Security,
    TargetSpec, Trade, Value, ValueProperties, ValueRequirement, ValueSpecification, ValueType, ViewCycle,
    ViewDefinition, ViewResultModel, FUNCTION_PROPERTY,
};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

pub const CALC_CONFIG: &str = "Default";
pub const MARKET_PRICE: &str = "Market Price";
pub const PRESENT_VALUE: &str = "Present Value";
pub const BUCKETED_PV01: &str = "Bucketed PV01";
pub const DISCOUNT_RATE: &str = "Discount Rate";
pub const CURVE: &str = "USD-CURVE";

const TENORS: [(&str, f64); 3] = [("1Y", 1.0), ("5Y", 5.0), ("10Y", 10.0)];

/// Function IDs and the names clients see for them.
pub const FUNCTIONS: [(&str, &str); 5] = [
    ("price-fn", "Market Price Lookup"),
    ("pv-fn", "Discounted Present Value"),
    ("pv01-fn", "Bucketed PV01"),
    ("sum-fn", "Portfolio Node Sum"),
    ("curve-fn", "Curve Construction"),
];

/// Even positions are fungible equities with two trades, odd ones OTC swaps
/// with a single trade.
pub fn demo_portfolio(positions: usize) -> Portfolio {
    let mut equities = PortfolioNode::new("equities", "Equities");
    let mut swaps = PortfolioNode::new("swaps", "Swaps");
    for i in 0..positions {
        let quantity = 100.0 * (i + 1) as f64;
        if i % 2 == 0 {
            let position = Position::new(
                &format!("pos-{}", i),
                quantity,
                Security::fungible(&format!("sec-{}", i), &format!("Stock {}", i)),
            )
            .with_trade(Trade::new(&format!("trade-{}-a", i), quantity / 2.0))
            .with_trade(Trade::new(&format!("trade-{}-b", i), quantity / 2.0));
            equities = equities.with_position(position);
        } else {
            let position = Position::new(
                &format!("pos-{}", i),
                quantity,
                Security::otc(&format!("sec-{}", i), &format!("{}Y Swap", i)),
            )
            .with_trade(Trade::new(&format!("trade-{}", i), quantity));
            swaps = swaps.with_position(position);
        }
    }
    let root = PortfolioNode::new("root", "Demo").with_child(equities).with_child(swaps);
    Portfolio::new("demo", "Demo Portfolio", root)
}

fn output(value_name: &str, target: TargetSpec, function_id: &str) -> ValueSpecification {
    ValueSpecification::new(
        value_name,
        target,
        ValueProperties::new().with(FUNCTION_PROPERTY, function_id),
    )
}

fn rate_spec() -> ValueSpecification {
    output(DISCOUNT_RATE, TargetSpec::primitive(CURVE), "curve-fn")
}

fn price_spec(position: &Position) -> ValueSpecification {
    output(MARKET_PRICE, TargetSpec::position(position.id.as_str()), "price-fn")
}

fn pv_spec(target: TargetSpec, function_id: &str) -> ValueSpecification {
    output(PRESENT_VALUE, target, function_id)
}

fn pv01_spec(position: &Position) -> ValueSpecification {
    output(BUCKETED_PV01, TargetSpec::position(position.id.as_str()), "pv01-fn")
}

/// Compiled view with one calculation configuration over the portfolio plus
/// the discount rate as a primitive.
pub fn demo_view(portfolio: &Portfolio) -> CompiledViewDefinition {
    let mut calc = CalculationConfiguration::new(CALC_CONFIG);
    calc.columns
        .push(ColumnDefinition::new("Price", MARKET_PRICE, ValueProperties::new()));
    calc.portfolio_requirements
        .push((PRESENT_VALUE.to_string(), ValueProperties::new()));
    calc.portfolio_requirements
        .push((BUCKETED_PV01.to_string(), ValueProperties::new()));
    calc.specific_requirements.push(ValueRequirement::new(
        DISCOUNT_RATE,
        TargetSpec::primitive(CURVE),
        ValueProperties::new(),
    ));

    let mut view = ViewDefinition::new("Demo View");
    view.calculation_configurations.push(calc);
    view.value_types.insert(MARKET_PRICE.to_string(), ValueType::Double);
    view.value_types.insert(PRESENT_VALUE.to_string(), ValueType::Double);
    view.value_types
        .insert(BUCKETED_PV01.to_string(), ValueType::LabelledVector);
    view.value_types.insert(DISCOUNT_RATE.to_string(), ValueType::Double);

    let mut compiled = CompiledViewDefinition::new(view);
    let mut graph = DependencyGraph::new();

    let rate = rate_spec();
    graph.add_node(DependencyNode {
        function_id: "curve-fn".to_string(),
        target: rate.target.clone(),
        inputs: vec![ValueSpecification::new(
            "Market Data",
            TargetSpec::primitive(CURVE),
            ValueProperties::new(),
        )],
        outputs: vec![rate.clone()],
    });
    map_value(&mut compiled, &rate);
    compile_node(&portfolio.root, &rate, &mut compiled, &mut graph);

    compiled.graphs.insert(CALC_CONFIG.to_string(), graph);
    compiled
}

fn map_value(compiled: &mut CompiledViewDefinition, spec: &ValueSpecification) {
    compiled.value_mappings.insert(
        CALC_CONFIG,
        ValueRequirement::new(&spec.value_name, spec.target.clone(), ValueProperties::new()),
        spec.clone(),
    );
}

fn compile_node(
    node: &PortfolioNode,
    rate: &ValueSpecification,
    compiled: &mut CompiledViewDefinition,
    graph: &mut DependencyGraph,
) -> ValueSpecification {
    let mut inputs = Vec::new();
    for child in &node.children {
        inputs.push(compile_node(child, rate, compiled, graph));
    }
    for position in &node.positions {
        let target = TargetSpec::position(position.id.as_str());
        let price = price_spec(position);
        let pv = pv_spec(target.clone(), "pv-fn");
        let pv01 = pv01_spec(position);
        graph.add_node(DependencyNode {
            function_id: "price-fn".to_string(),
            target: target.clone(),
            inputs: Vec::new(),
            outputs: vec![price.clone()],
        });
        graph.add_node(DependencyNode {
            function_id: "pv-fn".to_string(),
            target: target.clone(),
            inputs: vec![price.clone(), rate.clone()],
            outputs: vec![pv.clone()],
        });
        graph.add_node(DependencyNode {
            function_id: "pv01-fn".to_string(),
            target,
            inputs: vec![pv.clone(), rate.clone()],
            outputs: vec![pv01.clone()],
        });
        for spec in [&price, &pv, &pv01] {
            map_value(compiled, spec);
        }
        inputs.push(pv);
    }

    let node_pv = pv_spec(node.target(), "sum-fn");
    graph.add_node(DependencyNode {
        function_id: "sum-fn".to_string(),
        target: node.target(),
        inputs,
        outputs: vec![node_pv.clone()],
    });
    map_value(compiled, &node_pv);
    node_pv
}

// =============================================================================
// Cycles
// =============================================================================

/// Values of one synthetic cycle, queryable after the fact.
pub struct SimulatedCycle {
    cycle_id: u64,
    values: HashMap<ValueSpecification, ComputedValueResult>,
}

impl ViewCycle for SimulatedCycle {
    fn cycle_id(&self) -> Option<u64> {
        Some(self.cycle_id)
    }

    fn query_values(&self, calc_config: &str, specs: &[ValueSpecification]) -> Vec<ComputedValueResult> {
        if calc_config != CALC_CONFIG {
            return Vec::new();
        }
        specs
            .iter()
            .map(|spec| {
                self.values
                    .get(spec)
                    .cloned()
                    .unwrap_or_else(|| ComputedValueResult::new(spec.clone(), Value::not_available()))
            })
            .collect()
    }
}

/// Produces cycles over the demo portfolio.
pub struct SimulatedEngine {
    portfolio: Portfolio,
    compiled: Arc<CompiledViewDefinition>,
    prices: HashMap<ObjectId, f64>,
    rate: f64,
    cycle_id: u64,
}

impl SimulatedEngine {
    pub fn new(portfolio: Portfolio) -> Self {
        let compiled = Arc::new(demo_view(&portfolio));
        Self {
            portfolio,
            compiled,
            prices: HashMap::new(),
            rate: 0.04,
            cycle_id: 0,
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn compiled(&self) -> Arc<CompiledViewDefinition> {
        Arc::clone(&self.compiled)
    }

    /// Move the market and compute every mapped value.
    pub fn next_cycle(&mut self) -> (ViewResultModel, Arc<dyn ViewCycle>) {
        let mut rng = rand::thread_rng();
        self.cycle_id += 1;
        self.rate = (self.rate + rng.gen_range(-0.0005..0.0005)).max(0.0);

        let mut values = HashMap::new();
        let rate = rate_spec();
        values.insert(
            rate.clone(),
            ComputedValueResult::new(rate, Value::Double(self.rate)),
        );

        let root = self.portfolio.root.clone();
        self.price_node(&root, &mut rng, &mut values);

        let mut results = ViewResultModel::new(self.cycle_id);
        for result in values.values() {
            results.add(CALC_CONFIG, result.clone());
        }
        let cycle = SimulatedCycle {
            cycle_id: self.cycle_id,
            values,
        };
        (results, Arc::new(cycle))
    }

    fn price_node(
        &mut self,
        node: &PortfolioNode,
        rng: &mut impl Rng,
        values: &mut HashMap<ValueSpecification, ComputedValueResult>,
    ) -> f64 {
        let mut total = 0.0;
        for child in &node.children {
            total += self.price_node(child, rng, values);
        }
        for position in &node.positions {
            let price = self.prices.entry(position.id.clone()).or_insert(100.0);
            *price *= 1.0 + rng.gen_range(-0.01..0.01);
            let price = *price;
            let pv = position.quantity * price / (1.0 + self.rate);
            total += pv;

            let mut log = ExecutionLog::empty();
            if position.security.otc {
                log = log.with_event(LogLevel::Warn, "Discounting OTC cashflows on a flat curve");
            }
            let pv01 = LabelledVector::new(
                TENORS.iter().map(|(label, _)| label.to_string()).collect(),
                TENORS.iter().map(|(_, years)| pv * 0.0001 * years).collect(),
            );
            for (spec, value, log) in [
                (price_spec(position), Value::Double(price), ExecutionLog::empty()),
                (
                    pv_spec(TargetSpec::position(position.id.as_str()), "pv-fn"),
                    Value::Double(pv),
                    log,
                ),
                (pv01_spec(position), Value::Labelled(pv01), ExecutionLog::empty()),
            ] {
                values.insert(spec.clone(), ComputedValueResult::new(spec, value).with_log(log));
            }
        }
        let spec = pv_spec(node.target(), "sum-fn");
        values.insert(spec.clone(), ComputedValueResult::new(spec, Value::Double(total)));
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_portfolio_split() {
        let portfolio = demo_portfolio(4);
        assert_eq!(portfolio.root.children[0].positions.len(), 2);
        assert_eq!(portfolio.root.children[1].positions.len(), 2);
        assert!(portfolio.root.children[1].positions[0].security.otc);
    }

    #[test]
    fn test_every_mapped_value_is_computed() {
        let mut engine = SimulatedEngine::new(demo_portfolio(3));
        let (results, cycle) = engine.next_cycle();
        // rate + 3 positions x 3 values + 3 nodes
        assert_eq!(results.len(), 13);
        assert_eq!(cycle.cycle_id(), Some(1));

        let pv = pv_spec(TargetSpec::position("pos-0"), "pv-fn");
        let queried = cycle.query_values(CALC_CONFIG, &[pv]);
        assert!(matches!(queried[0].value, Value::Double(v) if v > 0.0));
    }

    #[test]
    fn test_unknown_specs_not_available() {
        let mut engine = SimulatedEngine::new(demo_portfolio(1));
        let (_, cycle) = engine.next_cycle();
        let unknown = ValueSpecification::new("Gamma", TargetSpec::position("pos-0"), ValueProperties::new());
        let queried = cycle.query_values(CALC_CONFIG, &[unknown]);
        assert_eq!(queried[0].value, Value::not_available());
        assert!(cycle.query_values("Other", &[]).is_empty());
    }
}
